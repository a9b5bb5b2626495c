//! Domain models: schools, ISPs, contracts and speed reports

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ethereum account or contract address.
///
/// Stored lowercased, so checksummed and plain spellings compare equal.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid address `{0}`: expected 0x followed by 40 hex digits")]
pub struct AddressError(pub String);

impl Address {
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        let raw = raw.trim();
        let hex = raw
            .strip_prefix("0x")
            .or_else(|| raw.strip_prefix("0X"))
            .ok_or_else(|| AddressError(raw.to_string()))?;
        if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AddressError(raw.to_string()));
        }
        Ok(Self(format!("0x{}", hex.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form for terminal output: `0x8c3f…cbf01`
    pub fn short(&self) -> String {
        format!("{}…{}", &self.0[..6], &self.0[self.0.len() - 5..])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct School {
    pub name: String,
    pub address: Option<Address>,
    pub country: String,
    pub score: f64,
    pub physical_address: String,
}

/// What a school stores in its `school_metadata` fact
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchoolMetadata {
    pub name: String,
    pub country: String,
    pub score: f64,
    #[serde(default)]
    pub physical_address: String,
}

impl SchoolMetadata {
    pub fn into_school(self, address: Address) -> School {
        School {
            name: self.name,
            address: Some(address),
            country: self.country,
            score: self.score,
            physical_address: self.physical_address,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Isp {
    pub name: String,
    pub address: Address,
    pub passport_address: Address,
    pub score: f64,
}

/// What an ISP stores in its `isp_metadata` fact
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IspMetadata {
    pub name: String,
    pub score: f64,
}

/// Contract lifecycle state, serialized as `0` / `1`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ContractStatus {
    #[default]
    Active,
    Inactive,
}

impl From<ContractStatus> for u8 {
    fn from(status: ContractStatus) -> Self {
        match status {
            ContractStatus::Active => 0,
            ContractStatus::Inactive => 1,
        }
    }
}

impl TryFrom<u8> for ContractStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ContractStatus::Active),
            1 => Ok(ContractStatus::Inactive),
            other => Err(format!("unknown contract state {other}")),
        }
    }
}

/// Connectivity agreement between an ISP and a school
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub id: String,
    pub isp_address: Option<Address>,
    pub isp_passport_address: Address,
    pub school_address: Address,
    /// Agreed speed, Mbps
    pub speed: f64,
    pub state: ContractStatus,
    pub connectivity_score: Option<f64>,
    pub date: Option<DateTime<Utc>>,
}

/// What a school stores in its `contract_metadata` fact on the ISP passport
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContractMetadata {
    pub id: String,
    pub speed: f64,
    #[serde(default)]
    pub state: ContractStatus,
}

impl ContractMetadata {
    pub fn into_contract(self, isp_passport_address: Address, school_address: Address) -> Contract {
        Contract {
            id: self.id,
            isp_address: None,
            isp_passport_address,
            school_address,
            speed: self.speed,
            state: self.state,
            connectivity_score: None,
            date: None,
        }
    }
}

impl From<&Contract> for ContractMetadata {
    fn from(contract: &Contract) -> Self {
        Self {
            id: contract.id.clone(),
            speed: contract.speed,
            state: contract.state,
        }
    }
}

/// One measured speed, as written by a school or an ISP
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FactReport {
    pub speed: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connectivity_score: Option<f64>,
}

/// Reports of one calendar day, merged from both parties
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FactReportEntry {
    pub date: DateTime<Utc>,
    pub isp_address: Option<Address>,
    pub isp_speed: Option<f64>,
    pub school_address: Option<Address>,
    pub school_speed: Option<f64>,
}

/// Human-readable quality bucket of a connectivity score
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ScoreBand {
    Unknown,
    Poor,
    Fair,
    Good,
}

impl ScoreBand {
    pub fn of(score: Option<f64>) -> Self {
        match score {
            None => ScoreBand::Unknown,
            Some(score) if score == 0.0 => ScoreBand::Unknown,
            Some(score) if score < 0.33 => ScoreBand::Poor,
            Some(score) if score < 0.77 => ScoreBand::Fair,
            Some(_) => ScoreBand::Good,
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            ScoreBand::Unknown => "gray",
            ScoreBand::Poor => "red",
            ScoreBand::Fair => "yellow",
            ScoreBand::Good => "green",
        }
    }
}

impl fmt::Display for ScoreBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ScoreBand::Unknown => "unknown",
            ScoreBand::Poor => "poor",
            ScoreBand::Fair => "fair",
            ScoreBand::Good => "good",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHECKSUMMED: &str = "0x8C3F546A89DA0e431Ea2D13a790b199f653cbf01";

    #[test]
    fn test_address_case_insensitive() {
        let a = Address::parse(CHECKSUMMED).unwrap();
        let b = Address::parse(&CHECKSUMMED.to_lowercase()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "0x8c3f546a89da0e431ea2d13a790b199f653cbf01");
        assert_eq!(a.short(), "0x8c3f…cbf01");
    }

    #[test]
    fn test_address_rejects_malformed() {
        assert!(Address::parse("8C3F546A89DA0e431Ea2D13a790b199f653cbf01").is_err());
        assert!(Address::parse("0x8C3F").is_err());
        assert!(Address::parse("0xZZ3F546A89DA0e431Ea2D13a790b199f653cbf01").is_err());
    }

    #[test]
    fn test_address_serde() {
        let a: Address = serde_json::from_str(&format!("\"{}\"", CHECKSUMMED)).unwrap();
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            "\"0x8c3f546a89da0e431ea2d13a790b199f653cbf01\""
        );
        assert!(serde_json::from_str::<Address>("\"0x12\"").is_err());
    }

    #[test]
    fn test_contract_state_serialized_as_number() {
        let meta = ContractMetadata {
            id: "1546300800000".into(),
            speed: 50.0,
            state: ContractStatus::Inactive,
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["state"], 1);

        let parsed: ContractMetadata =
            serde_json::from_str(r#"{"id":"1","speed":10}"#).unwrap();
        assert_eq!(parsed.state, ContractStatus::Active);
        assert!(
            serde_json::from_str::<ContractMetadata>(r#"{"id":"1","speed":10,"state":7}"#).is_err()
        );
    }

    #[test]
    fn test_score_bands() {
        assert_eq!(ScoreBand::of(None), ScoreBand::Unknown);
        assert_eq!(ScoreBand::of(Some(0.0)), ScoreBand::Unknown);
        assert_eq!(ScoreBand::of(Some(0.2)), ScoreBand::Poor);
        assert_eq!(ScoreBand::of(Some(0.33)), ScoreBand::Fair);
        assert_eq!(ScoreBand::of(Some(0.76)), ScoreBand::Fair);
        assert_eq!(ScoreBand::of(Some(0.77)), ScoreBand::Good);
        assert_eq!(ScoreBand::Poor.color(), "red");
        assert_eq!(ScoreBand::Good.to_string(), "good");
    }
}
