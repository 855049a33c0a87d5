pub mod bitcoin_client;
pub mod evm_client;
pub mod rpc_client;
pub mod solana_client;

pub use bitcoin_client::{AddressStats, BitcoinSource, EsploraClient, EsploraTx};
pub use evm_client::{EvmBlock, EvmClient, EvmSource, EvmTransaction};
pub use rpc_client::RpcClient;
pub use solana_client::{SignatureInfo, SolanaClient, SolanaSource, SolanaTransaction};
