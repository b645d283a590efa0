//! Evidence Ledger: an append-only, content-addressed log of claims,
//! tool calls, contradictions, human overrides, and raw observations.
//!
//! Ledger entries are never mutated once written. A claim's staleness is
//! never stored directly on the claim; it is always recomputed from the
//! entries related to it, so "is this claim stale" has one answer no
//! matter how long ago the claim was made.

use crate::config::StorageConfig;
use crate::error::{LibrarianError, Result};
use crate::object_id::ObjectId;
use crate::store::{validate_payload, PayloadKind, Store};
use crate::types::{Claim, EvidenceEntry, EvidenceKind};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
struct ClaimPayload {
    assertion: String,
    supporting_evidence: Vec<u64>,
    confidence: f32,
}

/// Payload shape stored for a defeater entry (Contradiction/HumanOverride).
/// `confidence` lets staleness be gated rather than a bare presence check:
/// a low-confidence contradiction shouldn't be enough to declare a claim
/// stale, while a human override always should regardless of its value.
#[derive(Serialize, Deserialize)]
struct DefeaterPayload {
    reason: String,
    confidence: f32,
}

/// Appends a claim to the ledger, returning the fully-formed `Claim` with
/// its assigned entry id. `defeaters` starts empty; it is always computed
/// fresh by [`get_claim`] rather than stored.
///
/// The assertion is validated against `storage`'s depth/size/shape limits
/// before it is written; ledger entries reject an oversize payload
/// outright rather than truncate it (integrity over availability).
pub fn append_claim(
    store: &Store,
    storage: &StorageConfig,
    subject: ObjectId,
    assertion: String,
    supporting_evidence: Vec<u64>,
    confidence: f32,
    provenance: &str,
    timestamp: i64,
) -> Result<Claim> {
    validate_payload(
        &serde_json::json!({ "assertion": assertion, "confidence": confidence }),
        storage.max_payload_depth,
        storage.max_blob_size,
        PayloadKind::Evidence,
    )?;

    let payload = ClaimPayload {
        assertion: assertion.clone(),
        supporting_evidence: supporting_evidence.clone(),
        confidence,
    };
    let payload_bytes =
        postcard::to_allocvec(&payload).map_err(|e| LibrarianError::Serialization(e.to_string()))?;

    let mut entry = EvidenceEntry {
        entry_id: 0,
        kind: EvidenceKind::Claim,
        payload: payload_bytes,
        provenance: provenance.to_string(),
        timestamp,
        related_entry_ids: supporting_evidence.clone(),
        content_hash: ObjectId::from_bytes([0; 32]),
    };

    let txn = store.begin()?;
    let entry_id = txn.append_ledger_entry(&mut entry)?;
    txn.index_ledger_subject(&subject, entry_id)?;
    txn.commit()?;

    Ok(Claim {
        entry_id,
        assertion,
        subject,
        supporting_evidence,
        defeaters: Vec::new(),
        confidence,
    })
}

/// Appends an entry (contradiction or human override) that, once
/// written, defeats an existing claim. `subject` should match the
/// defeated claim's subject so [`get_claim`] can find it during its scan.
///
/// `confidence` records how strongly this defeater should count toward
/// the defeated claim's staleness: a `HumanOverride` always defeats
/// regardless of its confidence, while a `Contradiction` only defeats if
/// its confidence clears the store's configured staleness threshold (see
/// [`find_defeaters`]).
pub fn append_defeater(
    store: &Store,
    storage: &StorageConfig,
    kind: EvidenceKind,
    subject: ObjectId,
    defeats_entry_id: u64,
    reason: &str,
    confidence: f32,
    provenance: &str,
    timestamp: i64,
) -> Result<u64> {
    if !matches!(kind, EvidenceKind::Contradiction | EvidenceKind::HumanOverride) {
        return Err(LibrarianError::InvalidArgument(
            "defeaters must be Contradiction or HumanOverride entries".to_string(),
        ));
    }

    let validated = validate_payload(
        &serde_json::json!({ "reason": reason, "confidence": confidence }),
        storage.max_payload_depth,
        storage.max_blob_size,
        PayloadKind::Evidence,
    )?;
    let payload_bytes = serde_json::to_vec(&validated)
        .map_err(|e| LibrarianError::Serialization(e.to_string()))?;

    let mut entry = EvidenceEntry {
        entry_id: 0,
        kind,
        payload: payload_bytes,
        provenance: provenance.to_string(),
        timestamp,
        related_entry_ids: vec![defeats_entry_id],
        content_hash: ObjectId::from_bytes([0; 32]),
    };

    let txn = store.begin()?;
    let entry_id = txn.append_ledger_entry(&mut entry)?;
    txn.index_ledger_subject(&subject, entry_id)?;
    txn.commit()?;

    Ok(entry_id)
}

/// Appends a raw observation or tool-call record with no claim attached.
/// `payload` is validated against `storage`'s limits before being
/// serialized: ledger entries reject an oversize payload outright.
pub fn append_observation(
    store: &Store,
    storage: &StorageConfig,
    kind: EvidenceKind,
    subject: ObjectId,
    payload: serde_json::Value,
    provenance: &str,
    timestamp: i64,
) -> Result<u64> {
    let validated = validate_payload(
        &payload,
        storage.max_payload_depth,
        storage.max_blob_size,
        PayloadKind::Evidence,
    )?;
    let payload_bytes = serde_json::to_vec(&validated)
        .map_err(|e| LibrarianError::Serialization(e.to_string()))?;

    let mut entry = EvidenceEntry {
        entry_id: 0,
        kind,
        payload: payload_bytes,
        provenance: provenance.to_string(),
        timestamp,
        related_entry_ids: Vec::new(),
        content_hash: ObjectId::from_bytes([0; 32]),
    };

    let txn = store.begin()?;
    let entry_id = txn.append_ledger_entry(&mut entry)?;
    txn.index_ledger_subject(&subject, entry_id)?;
    txn.commit()?;

    Ok(entry_id)
}

/// Loads a claim by its ledger entry id, recomputing its defeaters from
/// every Contradiction/HumanOverride entry filed against the same
/// subject that names this entry in its `related_entry_ids` and clears
/// `min_staleness_confidence` (see [`find_defeaters`]).
pub fn get_claim(
    store: &Store,
    subject: ObjectId,
    entry_id: u64,
    min_staleness_confidence: f32,
) -> Result<Option<Claim>> {
    let Some(entry) = store.get_ledger_entry(entry_id)? else {
        return Ok(None);
    };
    if entry.kind != EvidenceKind::Claim {
        return Ok(None);
    }
    let payload: ClaimPayload = postcard::from_bytes(&entry.payload)
        .map_err(|e| LibrarianError::Deserialization(e.to_string()))?;

    let defeaters = find_defeaters(store, subject, entry_id, min_staleness_confidence)?;

    Ok(Some(Claim {
        entry_id,
        assertion: payload.assertion,
        subject,
        supporting_evidence: payload.supporting_evidence,
        defeaters,
        confidence: payload.confidence,
    }))
}

/// Finds every Contradiction/HumanOverride entry id filed against
/// `subject` that names `entry_id` in its `related_entry_ids` and
/// qualifies as a real defeater: a `HumanOverride` always qualifies,
/// while a `Contradiction` only qualifies if its recorded confidence is
/// at least `min_staleness_confidence`. A defeater entry written before
/// this gate existed (no parseable confidence) is treated as confidence
/// 0 and so never qualifies on its own.
pub fn find_defeaters(
    store: &Store,
    subject: ObjectId,
    entry_id: u64,
    min_staleness_confidence: f32,
) -> Result<Vec<u64>> {
    let mut defeaters = Vec::new();
    for candidate_id in store.ledger_entries_for_subject(&subject)? {
        let Some(candidate) = store.get_ledger_entry(candidate_id)? else {
            continue;
        };
        if !matches!(candidate.kind, EvidenceKind::Contradiction | EvidenceKind::HumanOverride)
            || !candidate.related_entry_ids.contains(&entry_id)
        {
            continue;
        }
        if candidate.kind == EvidenceKind::HumanOverride {
            defeaters.push(candidate_id);
            continue;
        }
        let confidence = serde_json::from_slice::<DefeaterPayload>(&candidate.payload)
            .map(|p| p.confidence)
            .unwrap_or(0.0);
        if confidence >= min_staleness_confidence {
            defeaters.push(candidate_id);
        }
    }
    Ok(defeaters)
}

/// Returns every ledger entry filed against `subject`, optionally
/// filtered to a single [`EvidenceKind`].
pub fn entries_for_subject(
    store: &Store,
    subject: ObjectId,
    kind_filter: Option<EvidenceKind>,
) -> Result<Vec<EvidenceEntry>> {
    let mut out = Vec::new();
    for id in store.ledger_entries_for_subject(&subject)? {
        if let Some(entry) = store.get_ledger_entry(id)? {
            let matches_filter = match kind_filter {
                Some(k) => k == entry.kind,
                None => true,
            };
            if matches_filter {
                out.push(entry);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage() -> StorageConfig {
        StorageConfig::default()
    }

    #[test]
    fn claim_without_defeater_is_not_stale() {
        let tmp = TempDir::new().unwrap();
        let store = Store::create(tmp.path().join("store.redb")).unwrap();
        let subject = ObjectId::from_bytes([5; 32]);

        let claim = append_claim(
            &store,
            &storage(),
            subject,
            "foo calls bar".to_string(),
            vec![],
            0.8,
            "extractor",
            1000,
        )
        .unwrap();

        let loaded = get_claim(&store, subject, claim.entry_id, 0.5).unwrap().unwrap();
        assert!(!loaded.is_stale());
    }

    #[test]
    fn high_confidence_contradiction_makes_claim_stale() {
        let tmp = TempDir::new().unwrap();
        let store = Store::create(tmp.path().join("store.redb")).unwrap();
        let subject = ObjectId::from_bytes([5; 32]);

        let claim = append_claim(
            &store,
            &storage(),
            subject,
            "foo calls bar".to_string(),
            vec![],
            0.8,
            "extractor",
            1000,
        )
        .unwrap();

        append_defeater(
            &store,
            &storage(),
            EvidenceKind::Contradiction,
            subject,
            claim.entry_id,
            "bar was removed",
            0.9,
            "watcher",
            1001,
        )
        .unwrap();

        let loaded = get_claim(&store, subject, claim.entry_id, 0.5).unwrap().unwrap();
        assert!(loaded.is_stale());
        assert_eq!(loaded.defeaters.len(), 1);
    }

    #[test]
    fn low_confidence_contradiction_does_not_make_claim_stale() {
        let tmp = TempDir::new().unwrap();
        let store = Store::create(tmp.path().join("store.redb")).unwrap();
        let subject = ObjectId::from_bytes([5; 32]);

        let claim = append_claim(
            &store,
            &storage(),
            subject,
            "foo calls bar".to_string(),
            vec![],
            0.8,
            "extractor",
            1000,
        )
        .unwrap();

        append_defeater(
            &store,
            &storage(),
            EvidenceKind::Contradiction,
            subject,
            claim.entry_id,
            "maybe unrelated rename",
            0.2,
            "watcher",
            1001,
        )
        .unwrap();

        let loaded = get_claim(&store, subject, claim.entry_id, 0.5).unwrap().unwrap();
        assert!(!loaded.is_stale());
        assert!(loaded.defeaters.is_empty());
    }

    #[test]
    fn human_override_always_defeats_regardless_of_confidence() {
        let tmp = TempDir::new().unwrap();
        let store = Store::create(tmp.path().join("store.redb")).unwrap();
        let subject = ObjectId::from_bytes([5; 32]);

        let claim = append_claim(
            &store,
            &storage(),
            subject,
            "foo calls bar".to_string(),
            vec![],
            0.8,
            "extractor",
            1000,
        )
        .unwrap();

        append_defeater(
            &store,
            &storage(),
            EvidenceKind::HumanOverride,
            subject,
            claim.entry_id,
            "reviewed and rejected",
            0.01,
            "human",
            1001,
        )
        .unwrap();

        let loaded = get_claim(&store, subject, claim.entry_id, 0.5).unwrap().unwrap();
        assert!(loaded.is_stale());
    }

    #[test]
    fn unrelated_defeater_does_not_affect_other_claims() {
        let tmp = TempDir::new().unwrap();
        let store = Store::create(tmp.path().join("store.redb")).unwrap();
        let subject_a = ObjectId::from_bytes([1; 32]);
        let subject_b = ObjectId::from_bytes([2; 32]);

        let claim_a =
            append_claim(&store, &storage(), subject_a, "a".to_string(), vec![], 0.5, "x", 1).unwrap();
        let claim_b =
            append_claim(&store, &storage(), subject_b, "b".to_string(), vec![], 0.5, "x", 2).unwrap();

        append_defeater(
            &store,
            &storage(),
            EvidenceKind::Contradiction,
            subject_a,
            claim_a.entry_id,
            "gone",
            0.9,
            "watcher",
            3,
        )
        .unwrap();

        let a = get_claim(&store, subject_a, claim_a.entry_id, 0.5).unwrap().unwrap();
        let b = get_claim(&store, subject_b, claim_b.entry_id, 0.5).unwrap().unwrap();
        assert!(a.is_stale());
        assert!(!b.is_stale());
    }
}
