//! Transaction signing and sending.
//!
//! One sender per network, wrapping a locally-held private key. Every
//! funds-moving call goes through [`TransactionSender::send`]: sign, submit,
//! poll for the receipt, and report the realized fee. Gas price is whatever
//! snapshot the caller took for the current attempt.

use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use anyhow::Result;
use tracing::{debug, info, warn};

/// Receipt summary of one confirmed transaction.
#[derive(Debug, Clone)]
pub struct TxOutcome {
    pub tx_hash: B256,
    pub gas_used: u64,
    /// gas_used * effective gas price, wei.
    pub fee_wei: U256,
}

pub struct TransactionSender {
    rpc_url: String,
    wallet: EthereumWallet,
    /// The bot wallet address.
    pub address: Address,
}

impl TransactionSender {
    pub fn new(private_key: &str, rpc_url: &str) -> Result<Self> {
        let key = private_key.trim_start_matches("0x");
        let signer: PrivateKeySigner = key.parse()?;
        let address = signer.address();
        Ok(Self {
            rpc_url: rpc_url.to_string(),
            wallet: EthereumWallet::from(signer),
            address,
        })
    }

    /// Sign and submit a transaction, then wait for its receipt.
    pub async fn send(
        &self,
        to: Address,
        calldata: Bytes,
        gas_limit: u64,
        gas_price: U256,
    ) -> Result<TxOutcome> {
        debug!(
            to = %to,
            calldata_len = calldata.len(),
            gas_limit,
            "Sending transaction"
        );

        let provider = ProviderBuilder::new()
            .wallet(self.wallet.clone())
            .on_http(self.rpc_url.parse()?);

        let tx = TransactionRequest::default()
            .with_to(to)
            .with_input(calldata)
            .with_gas_limit(gas_limit)
            .with_gas_price(gas_price.to::<u128>());

        let pending = provider.send_transaction(tx).await?;
        let tx_hash = *pending.tx_hash();
        let receipt = pending.get_receipt().await?;

        let gas_used = receipt.gas_used;
        let fee_wei = U256::from(gas_used) * U256::from(receipt.effective_gas_price);

        if receipt.status() {
            info!(
                tx_hash = %tx_hash,
                block = receipt.block_number.unwrap_or(0),
                gas_used,
                "Transaction confirmed"
            );
            Ok(TxOutcome {
                tx_hash,
                gas_used,
                fee_wei,
            })
        } else {
            warn!(tx_hash = %tx_hash, "Transaction reverted");
            anyhow::bail!("transaction reverted: {tx_hash}")
        }
    }

    /// Native-currency balance of the bot wallet.
    pub async fn native_balance(&self) -> Result<U256> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        Ok(provider.get_balance(self.address).await?)
    }
}

impl std::fmt::Debug for TransactionSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionSender")
            .field("address", &self.address)
            .field("rpc_url", &self.rpc_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_derives_address() {
        // Well-known hardhat test key (never funded on a real network).
        let private_key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
        let sender = TransactionSender::new(private_key, "http://127.0.0.1:8545/").unwrap();
        assert_eq!(
            format!("{:?}", sender.address).to_lowercase(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );

        // The 0x prefix is optional.
        let bare = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
        let sender2 = TransactionSender::new(bare, "http://127.0.0.1:8545/").unwrap();
        assert_eq!(sender.address, sender2.address);
    }
}
