pub mod event_handlers;
