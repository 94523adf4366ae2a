//! # Parameter store tests

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use cv_stereo_tuner::params::{
    available_fields, RejectReason, DEFAULT_BLOCK_SIZE, DEFAULT_NUM_DISPARITIES
};
use cv_stereo_tuner::prelude::*;

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

fn store() -> ParameterStore {
    ParameterStore::new(640, 480)
}

#[test]
fn defaults() {
    let store = store();

    assert_eq!(store.kind(), AlgorithmKind::BlockMatch);
    assert_eq!(store.get(FieldId::BlockSize), Some(DEFAULT_BLOCK_SIZE));
    assert_eq!(store.get(FieldId::NumDisparities), Some(DEFAULT_NUM_DISPARITIES));
    assert_eq!(store.get(FieldId::Disp12MaxDiff), Some(-1));
    assert_eq!(store.get(FieldId::PreFilterCap), Some(1));
    assert_eq!(store.get(FieldId::P1), None);
}

#[test]
fn even_block_size_is_adjusted_not_stored() {
    let mut store = store();

    assert_eq!(store.set(FieldId::BlockSize, 8), SetOutcome::Adjusted(9));
    assert_eq!(store.get(FieldId::BlockSize), Some(DEFAULT_BLOCK_SIZE));

    assert_eq!(store.set(FieldId::BlockSize, 9), SetOutcome::Accepted);
    assert_eq!(store.get(FieldId::BlockSize), Some(9));
}

#[test]
fn even_pre_filter_size_is_adjusted() {
    let mut store = store();

    assert_eq!(store.set(FieldId::PreFilterSize, 10), SetOutcome::Adjusted(11));
    assert_eq!(store.set_with_adjust(FieldId::PreFilterSize, 10), SetOutcome::Accepted);
    assert_eq!(store.get(FieldId::PreFilterSize), Some(11));
}

#[test]
fn num_disparities_rounds_up_to_step() {
    let mut store = store();

    assert_eq!(store.set(FieldId::NumDisparities, 65), SetOutcome::Adjusted(80));
    assert_eq!(store.set(FieldId::NumDisparities, 16), SetOutcome::Accepted);
    assert_eq!(store.set(FieldId::NumDisparities, 0), SetOutcome::Adjusted(16));
    assert_eq!(store.set(FieldId::NumDisparities, -5), SetOutcome::Adjusted(16));
    assert_eq!(store.get(FieldId::NumDisparities), Some(16));
}

#[test]
fn every_even_window_is_adjusted_to_the_next_odd() {
    let mut store = store();

    for &field in &[FieldId::BlockSize, FieldId::PreFilterSize] {
        for v in (-64..=400).filter(|v| v % 2 == 0) {
            assert_eq!(store.set(field, v), SetOutcome::Adjusted(v + 1), "{} = {}", field, v);
        }
        assert_eq!(store.get(field), MatcherParameters::defaults(AlgorithmKind::BlockMatch).get(field));
    }

    assert_eq!(store.set(FieldId::BlockSize, i32::MAX - 1), SetOutcome::Adjusted(i32::MAX));
    assert_eq!(
        store.set(FieldId::BlockSize, i32::MAX),
        SetOutcome::Rejected(RejectReason::ExceedsImage { limit: 480 })
    );
}

#[test]
fn every_odd_window_inside_the_image_is_accepted() {
    let mut store = store();

    for v in (1..480).filter(|v| v % 2 != 0) {
        assert_eq!(store.set(FieldId::BlockSize, v), SetOutcome::Accepted, "blockSize = {}", v);
        assert_eq!(store.get(FieldId::BlockSize), Some(v));
    }

    for v in (481..=1023).filter(|v| v % 2 != 0) {
        assert_eq!(
            store.set(FieldId::BlockSize, v),
            SetOutcome::Rejected(RejectReason::ExceedsImage { limit: 480 })
        );
    }
}

#[test]
fn every_num_disparities_rounds_up_to_a_multiple_of_step() {
    let mut store = store();

    for v in 1..=1024 {
        let expected = if v % 16 == 0 {
            SetOutcome::Accepted
        }
        else {
            SetOutcome::Adjusted((v + 15) / 16 * 16)
        };
        assert_eq!(store.set(FieldId::NumDisparities, v), expected, "numDisparities = {}", v);
    }
    assert_eq!(store.get(FieldId::NumDisparities), Some(1024));

    for v in -64..=0 {
        assert_eq!(store.set(FieldId::NumDisparities, v), SetOutcome::Adjusted(16));
    }

    assert_eq!(
        store.set(FieldId::NumDisparities, i32::MAX),
        SetOutcome::Rejected(RejectReason::OutOfRange { value: i32::MAX })
    );
    assert_eq!(store.get(FieldId::NumDisparities), Some(1024));
}

#[test]
fn window_larger_than_image_is_rejected() {
    let mut store = ParameterStore::new(64, 48);

    assert_eq!(
        store.set(FieldId::BlockSize, 49),
        SetOutcome::Rejected(RejectReason::ExceedsImage { limit: 48 })
    );
    assert_eq!(store.set(FieldId::BlockSize, 47), SetOutcome::Accepted);
}

#[test]
fn fields_of_the_other_kind_are_not_applicable() {
    let mut store = store();

    assert_eq!(
        store.set(FieldId::P1, 8),
        SetOutcome::Rejected(RejectReason::NotApplicable {
            field: FieldId::P1,
            kind: AlgorithmKind::BlockMatch
        })
    );

    store.set_kind(AlgorithmKind::SemiGlobalBlockMatch);
    assert!(matches!(
        store.set(FieldId::TextureThreshold, 10),
        SetOutcome::Rejected(RejectReason::NotApplicable { .. })
    ));
    assert_eq!(store.set(FieldId::P1, 8), SetOutcome::Accepted);
}

#[test]
fn unknown_enumeration_value_is_rejected() {
    let mut store = store();

    assert!(matches!(
        store.set(FieldId::PreFilterType, 7),
        SetOutcome::Rejected(RejectReason::UnknownVariant { .. })
    ));
    assert_eq!(store.get(FieldId::PreFilterType), Some(0));
}

#[test]
fn records_survive_kind_switches() {
    let mut store = store();

    assert_eq!(store.set(FieldId::BlockSize, 15), SetOutcome::Accepted);

    store.set_kind(AlgorithmKind::SemiGlobalBlockMatch);
    assert_eq!(store.get(FieldId::BlockSize), Some(DEFAULT_BLOCK_SIZE));
    assert_eq!(store.set(FieldId::BlockSize, 7), SetOutcome::Accepted);

    store.set_kind(AlgorithmKind::BlockMatch);
    assert_eq!(store.get(FieldId::BlockSize), Some(15));
    assert_eq!(
        store.record(AlgorithmKind::SemiGlobalBlockMatch).get(FieldId::BlockSize),
        Some(7)
    );
}

#[test]
fn reset_restores_both_records() {
    let mut store = store();

    store.set_kind(AlgorithmKind::SemiGlobalBlockMatch);
    assert_eq!(store.set(FieldId::P2, 32), SetOutcome::Accepted);
    store.reset();

    assert_eq!(store.kind(), AlgorithmKind::BlockMatch);
    assert_eq!(
        store.record(AlgorithmKind::SemiGlobalBlockMatch),
        MatcherParameters::defaults(AlgorithmKind::SemiGlobalBlockMatch)
    );
}

#[test]
fn every_record_field_is_readable() {
    for &kind in &[AlgorithmKind::BlockMatch, AlgorithmKind::SemiGlobalBlockMatch] {
        let record = MatcherParameters::defaults(kind);

        for field in FieldId::ALL.iter() {
            let available = available_fields(kind).contains(field);
            assert_eq!(record.get(*field).is_some(), available, "{} on {}", field, kind);
        }
    }
}
