// src/provenance/mod.rs

//! Tracks the lineage of each run as a hash-linked chain of stage records.
//!
//! Every record carries the SHA-256 of the data its stage produced and the
//! hash of the record before it, so a persisted chain can be checked for
//! tampering or truncation with [`ProvenanceChain::verify`].

use crate::{EngineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Represents a single record in the provenance chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub data_hash: String,
    pub software_version: String,
    pub previous_record_hash: Option<String>,
    pub metadata: serde_json::Value,
}

impl ProvenanceRecord {
    pub fn new(
        event_type: impl Into<String>,
        data: &[u8],
        software_version: impl Into<String>,
        previous_record_hash: Option<String>,
        metadata: serde_json::Value,
    ) -> Self {
        ProvenanceRecord {
            timestamp: Utc::now(),
            event_type: event_type.into(),
            data_hash: calculate_hash(data),
            software_version: software_version.into(),
            previous_record_hash,
            metadata,
        }
    }

    /// Calculates the hash of the current record for linking.
    pub fn calculate_record_hash(&self) -> Result<String> {
        let serialized = serde_json::to_string(self)?;
        Ok(calculate_hash(serialized.as_bytes()))
    }
}

/// Calculates the SHA256 hash of a byte slice as lowercase hex.
pub(crate) fn calculate_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Manages the chain of ProvenanceRecords.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProvenanceChain {
    records: Vec<ProvenanceRecord>,
}

impl ProvenanceChain {
    pub fn new() -> Self {
        ProvenanceChain {
            records: Vec::new(),
        }
    }

    /// Appends a record for a stage, linked to the current last record and
    /// stamped with this crate's version.
    pub fn add_record(
        &mut self,
        event_type: &str,
        data: &[u8],
        metadata: serde_json::Value,
    ) -> Result<()> {
        let previous_record_hash = match self.records.last() {
            Some(record) => Some(record.calculate_record_hash()?),
            None => None,
        };
        self.records.push(ProvenanceRecord::new(
            event_type,
            data,
            env!("CARGO_PKG_VERSION"),
            previous_record_hash,
            metadata,
        ));
        Ok(())
    }

    pub fn records(&self) -> &[ProvenanceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Checks that every record links to the hash of its predecessor.
    pub fn verify(&self) -> Result<()> {
        let mut expected: Option<String> = None;
        for (i, record) in self.records.iter().enumerate() {
            if record.previous_record_hash != expected {
                return Err(EngineError::Resumption(format!(
                    "provenance record {} ({}) is not linked to its predecessor",
                    i, record.event_type
                )));
            }
            expected = Some(record.calculate_record_hash()?);
        }
        Ok(())
    }

    /// Serializes the entire chain to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.records)?)
    }

    /// Deserializes a provenance chain from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        let records = serde_json::from_str(json_str)?;
        Ok(ProvenanceChain { records })
    }

    /// Consumes the ProvenanceChain and returns its records.
    pub fn take_records(self) -> Vec<ProvenanceRecord> {
        self.records
    }

    /// Drains all records, leaving the chain empty for the next run.
    pub fn drain(&mut self) -> ProvenanceChain {
        ProvenanceChain {
            records: std::mem::take(&mut self.records),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provenance_record_creation() {
        let data = b"mesh samples";
        let record = ProvenanceRecord::new(
            "mesh_generation",
            data,
            "v1.0.0",
            None,
            serde_json::json!({"nphi": 16}),
        );

        assert_eq!(record.event_type, "mesh_generation");
        assert_eq!(record.software_version, "v1.0.0");
        assert!(record.previous_record_hash.is_none());
        assert_eq!(record.metadata["nphi"], 16);
        assert_eq!(record.data_hash, calculate_hash(data));
    }

    #[test]
    fn test_provenance_chain_linking() {
        let mut chain = ProvenanceChain::new();
        chain
            .add_record("mesh_generation", b"mesh", serde_json::json!({"nr": 8}))
            .unwrap();
        let first_hash = chain.records()[0].calculate_record_hash().unwrap();

        chain
            .add_record("problem_assembly", b"problem", serde_json::json!({"family": "helmholtz"}))
            .unwrap();
        let second = &chain.records()[1];
        assert_eq!(second.previous_record_hash, Some(first_hash));
        let second_hash = second.calculate_record_hash().unwrap();

        chain
            .add_record("solver_run", b"field", serde_json::json!({}))
            .unwrap();
        assert_eq!(
            chain.records()[2].previous_record_hash.as_deref(),
            Some(second_hash.as_str())
        );
        assert!(chain.verify().is_ok());
    }

    #[test]
    fn test_tampered_chain_fails_verification() {
        let mut chain = ProvenanceChain::new();
        chain.add_record("mesh_generation", b"a", serde_json::json!({})).unwrap();
        chain.add_record("solver_run", b"b", serde_json::json!({})).unwrap();
        let mut records = chain.take_records();
        records[0].data_hash = calculate_hash(b"other");
        let tampered = ProvenanceChain { records };
        assert!(matches!(tampered.verify(), Err(EngineError::Resumption(_))));
    }

    #[test]
    fn test_provenance_chain_serialization() {
        let mut chain = ProvenanceChain::new();
        chain.add_record("mesh_generation", b"data1", serde_json::json!({"nr": 4})).unwrap();
        chain.add_record("solver_run", b"data2", serde_json::json!({"iterations": 10})).unwrap();

        let json_output = chain.to_json().unwrap();
        let deserialized = ProvenanceChain::from_json(&json_output).unwrap();
        assert_eq!(chain, deserialized);
        assert!(deserialized.verify().is_ok());

        let drained = chain.drain();
        assert!(chain.is_empty());
        assert_eq!(drained.len(), 2);
    }
}
