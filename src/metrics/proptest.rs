//! Property-Based Tests for Metric Naming
//!
//! Uses proptest to check the counter-to-metric-name derivation across
//! arbitrary vCenter group and name keys.
//!
//! # Test Properties
//!
//! 1. **Legality**: every derived name is a legal metric identifier
//! 2. **Determinism**: the same catalogue always yields the same descriptors
//! 3. **Key Uniqueness**: the registry never publishes a name twice, under
//!    either collision policy

#![cfg(test)]

use std::collections::HashSet;

use proptest::prelude::*;

use super::naming::{camel_to_snake, is_valid_metric_name, metric_name};
use super::registry::{CollisionPolicy, CounterRegistry};
use crate::domain::CounterInfo;

// =============================================================================
// Property Strategies
// =============================================================================

/// camelCase-ish identifiers like `cpu`, `virtualDisk`, `HTTPServer`.
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z][a-zA-Z0-9]{0,15}"
}

/// Dotted name keys like `usage.average`.
fn name_key_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(key_strategy(), 1..4).prop_map(|parts| parts.join("."))
}

/// Arbitrary printable keys, including characters that need sanitising.
fn messy_key_strategy() -> impl Strategy<Value = String> {
    "[ -~]{0,20}"
}

/// Catalogues drawn from a tiny key space, so names collide often and some
/// name keys look like already suffixed names (`usage.7`).
fn colliding_catalogue_strategy() -> impl Strategy<Value = Vec<CounterInfo>> {
    let group = prop::sample::select(vec!["cpu", "Cpu", "CPU"]);
    let name = prop::sample::select(vec!["usage", "usage.1", "usage.2", "usage.7", "usage.7.7"]);
    prop::collection::vec((group, name), 0..12).prop_map(|entries| {
        entries
            .into_iter()
            .enumerate()
            .map(|(i, (group, name))| CounterInfo::new(i as i32 + 1, group, name, "summary"))
            .collect()
    })
}

fn catalogue_strategy() -> impl Strategy<Value = Vec<CounterInfo>> {
    prop::collection::vec((key_strategy(), name_key_strategy()), 0..40).prop_map(|entries| {
        entries
            .into_iter()
            .enumerate()
            .map(|(i, (group, name))| CounterInfo::new(i as i32 + 1, group, name, "summary"))
            .collect()
    })
}

// =============================================================================
// Naming Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: a derived name is always a legal identifier, or an error.
    #[test]
    fn prop_metric_name_is_legal(group in messy_key_strategy(), name in messy_key_strategy()) {
        if let Ok(full) = metric_name(&group, &name) {
            prop_assert!(is_valid_metric_name(&full));
            prop_assert!(full.starts_with("vsphere_"));
        }
    }

    /// Property: well-formed keys always produce a name.
    #[test]
    fn prop_well_formed_keys_are_accepted(group in key_strategy(), name in name_key_strategy()) {
        prop_assert!(metric_name(&group, &name).is_ok());
    }

    /// Property: snake-cased output contains no upper-case letters.
    #[test]
    fn prop_camel_to_snake_is_lower_case(key in key_strategy()) {
        let snake = camel_to_snake(&key);
        prop_assert!(!snake.chars().any(|c| c.is_uppercase()));
    }

    /// Property: conversion is idempotent on its own output.
    #[test]
    fn prop_camel_to_snake_idempotent(key in key_strategy()) {
        let once = camel_to_snake(&key);
        prop_assert_eq!(camel_to_snake(&once), once);
    }
}

// =============================================================================
// Registry Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: building twice from the same catalogue yields the same
    /// descriptors.
    #[test]
    fn prop_build_is_deterministic(catalogue in catalogue_strategy()) {
        let a = CounterRegistry::build(&catalogue, CollisionPolicy::Overwrite);
        let b = CounterRegistry::build(&catalogue, CollisionPolicy::Overwrite);

        let a: Vec<_> = a.iter().map(|d| (d.counter_id(), d.name().to_string())).collect();
        let b: Vec<_> = b.iter().map(|d| (d.counter_id(), d.name().to_string())).collect();
        prop_assert_eq!(a, b);
    }

    /// Property: published names are unique under the overwrite policy.
    #[test]
    fn prop_names_unique(catalogue in catalogue_strategy()) {
        let registry = CounterRegistry::build(&catalogue, CollisionPolicy::Overwrite);

        let names: HashSet<_> = registry.iter().map(|d| d.name().to_string()).collect();
        prop_assert_eq!(names.len(), registry.len());
        prop_assert_eq!(
            registry.report().registered + registry.report().collisions,
            catalogue.len()
        );

        let suffixed = CounterRegistry::build(&catalogue, CollisionPolicy::SuffixCounterId);
        let names: HashSet<_> = suffixed.iter().map(|d| d.name().to_string()).collect();
        prop_assert_eq!(names.len(), suffixed.len());
        prop_assert_eq!(suffixed.len(), catalogue.len());
    }

    /// Property: with id suffixes every counter is published under its own
    /// name, even when a suffixed name is taken by another counter.
    #[test]
    fn prop_suffixed_names_unique(catalogue in colliding_catalogue_strategy()) {
        let registry = CounterRegistry::build(&catalogue, CollisionPolicy::SuffixCounterId);

        let names: HashSet<_> = registry.iter().map(|d| d.name().to_string()).collect();
        prop_assert_eq!(names.len(), registry.len());
        prop_assert_eq!(registry.len(), catalogue.len());
        prop_assert!(names.iter().all(|n| is_valid_metric_name(n)));
    }
}
