pub mod validation_poller;
