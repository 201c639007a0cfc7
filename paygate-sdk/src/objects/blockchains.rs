use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// All blockchains the processing engine reports on
pub enum Blockchain {
    Bitcoin,
    Litecoin,
    Ethereum,
    Bsc,
    Polygon,
    Arbitrum,
    Tron,
}

impl Blockchain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Blockchain::Bitcoin => "bitcoin",
            Blockchain::Litecoin => "litecoin",
            Blockchain::Ethereum => "ethereum",
            Blockchain::Bsc => "bsc",
            Blockchain::Polygon => "polygon",
            Blockchain::Arbitrum => "arbitrum",
            Blockchain::Tron => "tron",
        }
    }

    /// Whether token transfers on this chain are paid for with the native coin,
    /// so a token movement also changes the sender's native balance.
    pub fn pays_fees_in_native_token(&self) -> bool {
        !matches!(self, Blockchain::Bitcoin | Blockchain::Litecoin)
    }
}

impl std::fmt::Display for Blockchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Kind of wallet a notification refers to.
pub enum WalletType {
    /// Custodial wallet operated by the processing engine.
    Processing,
    /// Per-store hot wallet.
    Hot,
    /// Per-store cold wallet.
    Cold,
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for WalletType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WalletType::Processing => write!(f, "processing"),
            WalletType::Hot => write!(f, "hot"),
            WalletType::Cold => write!(f, "cold"),
            WalletType::Unknown => write!(f, "unknown"),
        }
    }
}
