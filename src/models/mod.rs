pub mod operation;
pub mod wallet;

/// Reserved identifier for the process-configured issuer identity. It is
/// never written to the wallets table; the credential store resolves it
/// from configuration.
pub const ISSUER_WALLET_ID: &str = "issuer";
