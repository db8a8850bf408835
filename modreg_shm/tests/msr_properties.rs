//! Property tests for the MSR build pipeline (SPEC_FULL.md §8: offset-closure
//! and count-exactness over randomly generated schema trees).
//!
//! "Offset-closure" is exercised implicitly: every accessor in
//! [`modreg_shm::arena::Arena`] and [`modreg_shm::registry::msr`] returns
//! `Internal` rather than panicking on an out-of-range offset, so a
//! `view_module` walk across an arbitrary built tree either succeeds or
//! fails cleanly — it never panics. "Count-exactness" is asserted directly:
//! every array length read back must equal the length that went in.

use modreg_shm::arena::Arena;
use modreg_shm::registry::build::store_modules;
use modreg_shm::registry::layout::{DepKind, SchemaDep, SchemaModule, SchemaTree, HEADER_SIZE};
use modreg_shm::registry::msr::{find_module, view_module};
use modreg_shm::registry::assert_closed;
use proptest::prelude::*;

/// Upper bound on the number of modules a generated tree may contain, to
/// keep each property run fast while still exercising multi-module
/// dependency wiring.
const MAX_N: usize = 6;

/// A generated module is `(feature_count, depends_on_module_zero)`; module 0
/// never depends on itself, so only modules with index > 0 take the dep.
fn tree_strategy() -> impl Strategy<Value = SchemaTree> {
    prop::collection::vec((0u8..4, any::<bool>()), 1..=MAX_N).prop_map(|specs| {
        let modules = specs
            .iter()
            .enumerate()
            .map(|(i, &(feat_count, wants_dep))| {
                let enabled_features = (0..feat_count).map(|f| format!("feat{i}_{f}")).collect();
                let deps = if i > 0 && wants_dep {
                    vec![SchemaDep {
                        kind: DepKind::Ref,
                        module: Some("m0".into()),
                        path: None,
                    }]
                } else {
                    vec![]
                };
                SchemaModule {
                    name: format!("m{i}"),
                    revision: if i % 2 == 0 { "2020-01-01".into() } else { "".into() },
                    replay_support: i % 3 == 0,
                    enabled_features,
                    deps,
                    inverse_deps: vec![],
                    rpcs: vec![],
                    notifications: vec![],
                }
            })
            .collect();
        SchemaTree { modules }
    })
}

fn built_arena(tree: &SchemaTree) -> Arena {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("main_shm");
    std::mem::forget(dir);
    let mut arena = Arena::create(&path, HEADER_SIZE, 0o600).unwrap();
    let shm_end = store_modules(&mut arena, tree).unwrap();
    assert_closed(&arena, shm_end).unwrap();
    arena
}

proptest! {
    #[test]
    fn offset_closure_and_count_exactness(tree in tree_strategy()) {
        let arena = built_arena(&tree);

        for m in &tree.modules {
            let idx = find_module(&arena, &m.name).unwrap();
            let view = view_module(&arena, idx).unwrap();

            prop_assert_eq!(&view.name, &m.name);
            prop_assert_eq!(view.enabled_features.len(), m.enabled_features.len());
            prop_assert_eq!(view.deps.len(), m.deps.len());
            prop_assert_eq!(view.replay_support, m.replay_support);

            for (got, want) in view.enabled_features.iter().zip(&m.enabled_features) {
                prop_assert_eq!(got, want);
            }
            for (got, want) in view.deps.iter().zip(&m.deps) {
                prop_assert_eq!(&got.module, &want.module);
                prop_assert_eq!(&got.path, &want.path);
            }
        }
    }
}

#[test]
fn malformed_ref_dep_is_rejected_before_writing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("main_shm");
    let mut arena = Arena::create(&path, HEADER_SIZE, 0o600).unwrap();

    let tree = SchemaTree {
        modules: vec![SchemaModule {
            name: "m0".into(),
            revision: "".into(),
            replay_support: false,
            enabled_features: vec![],
            deps: vec![SchemaDep {
                kind: DepKind::Ref,
                module: None,
                path: None,
            }],
            inverse_deps: vec![],
            rpcs: vec![],
            notifications: vec![],
        }],
    };

    let result = store_modules(&mut arena, &tree);
    assert!(matches!(result, Err(modreg_shm::RegistryError::InvalArg(_))));
}

#[test]
fn malformed_instid_dep_without_path_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("main_shm");
    let mut arena = Arena::create(&path, HEADER_SIZE, 0o600).unwrap();

    let tree = SchemaTree {
        modules: vec![SchemaModule {
            name: "m0".into(),
            revision: "".into(),
            replay_support: false,
            enabled_features: vec![],
            deps: vec![SchemaDep {
                kind: DepKind::InstId,
                module: None,
                path: None,
            }],
            inverse_deps: vec![],
            rpcs: vec![],
            notifications: vec![],
        }],
    };

    let result = store_modules(&mut arena, &tree);
    assert!(matches!(result, Err(modreg_shm::RegistryError::InvalArg(_))));
}
