//! Known chains and the subset a session may connect to.

pub const MAINNET: u64 = 1;
pub const GOERLI: u64 = 5;
pub const BNB_TESTNET: u64 = 97;
pub const POLYGON_MAINNET: u64 = 137;
pub const POLYGON_MUMBAI: u64 = 80001;

/// Chain used when the host does not pick one.
pub const DEFAULT_CHAIN_ID: u64 = BNB_TESTNET;

pub const SUPPORTED_CHAINS: &[u64] = &[GOERLI, POLYGON_MAINNET, POLYGON_MUMBAI, BNB_TESTNET];

pub fn is_supported(chain_id: u64) -> bool {
    SUPPORTED_CHAINS.contains(&chain_id)
}

pub fn chain_name(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        MAINNET => Some("ethereum"),
        GOERLI => Some("goerli"),
        BNB_TESTNET => Some("bnb-testnet"),
        POLYGON_MAINNET => Some("polygon"),
        POLYGON_MUMBAI => Some("polygon-mumbai"),
        _ => None,
    }
}

/// Public RPC endpoint for chains that have one without an API key.
pub fn public_rpc_url(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        BNB_TESTNET => Some("https://data-seed-prebsc-1-s1.binance.org:8545/"),
        _ => None,
    }
}
