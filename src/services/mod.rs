pub mod credential_store;
pub mod intents;
pub mod ledger;
pub mod redaction;
pub mod signer_locks;
pub mod step_executor;
pub mod transitions;
