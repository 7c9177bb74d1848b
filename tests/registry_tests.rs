//! Handler registry: canonical-path deduplication, index assignment, and
//! instantiation failure handling.

mod common;

use backplane::{
    FactoryTable, HandlerBinding, HandlerRegistry, HandlerRequest, HandlerResponse,
    InstantiationError, LoadError, RouteConfig, ServerContext,
};
use common::fixtures::{BrokenFactory, CountingFactory};
use std::sync::Arc;

fn registry_with(paths: &[&str]) -> HandlerRegistry {
    let table = Arc::new(FactoryTable::new());
    for path in paths {
        let (factory, _calls) = CountingFactory::new("ok");
        table.register(*path, factory);
    }
    HandlerRegistry::new(table, "/srv/modules")
}

#[test]
fn test_same_path_resolves_to_same_index() {
    let mut registry = registry_with(&["/srv/modules/a.so", "/srv/modules/b.so"]);
    let first = registry.resolve_or_register("/srv/modules/a.so").unwrap();
    let again = registry.resolve_or_register("/srv/modules/a.so").unwrap();
    assert_eq!(first, again);
    assert_eq!(registry.len(), 1);

    let other = registry.resolve_or_register("/srv/modules/b.so").unwrap();
    assert_ne!(first, other);
    assert_eq!(registry.len(), 2);

    // indices are 0-based in registration order
    assert_eq!(first, 0);
    assert_eq!(other, 1);
}

#[test]
fn test_relative_paths_canonicalize_beneath_prefix() {
    let mut registry = registry_with(&["/srv/modules/app.so"]);
    let by_relative = registry.resolve_or_register("app.so").unwrap();
    let by_absolute = registry.resolve_or_register("/srv/modules/app.so").unwrap();
    assert_eq!(by_relative, by_absolute);
    assert_eq!(registry.module_path(by_relative), Some("/srv/modules/app.so"));
}

#[test]
fn test_unknown_module_is_load_error() {
    let mut registry = registry_with(&[]);
    let err = registry.resolve_or_register("/srv/modules/ghost.so").unwrap_err();
    assert_eq!(
        err,
        LoadError::NotFound("/srv/modules/ghost.so".to_string())
    );
    assert!(registry.is_empty());
}

#[test]
fn test_instantiate_produces_working_handler() {
    let table = Arc::new(FactoryTable::new());
    let (factory, calls) = CountingFactory::new("from module");
    table.register("/srv/modules/app.so", factory);
    let mut registry = HandlerRegistry::new(table, "/srv/modules");

    let index = registry.resolve_or_register("app.so").unwrap();
    let mut handler = registry.instantiate(index).unwrap();

    let req = HandlerRequest::default();
    let mut res = HandlerResponse::new();
    handler.handle(&req, &mut res);
    assert_eq!(res.body, b"from module");
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[test]
fn test_failed_construction_is_instantiation_error() {
    let table = Arc::new(FactoryTable::new());
    table.register("/srv/modules/broken.so", Arc::new(BrokenFactory));
    let mut registry = HandlerRegistry::new(table, "/srv/modules");

    let index = registry.resolve_or_register("broken.so").unwrap();
    let err = registry.instantiate(index).unwrap_err();
    assert_eq!(
        err,
        InstantiationError {
            path: "/srv/modules/broken.so".to_string()
        }
    );
}

#[test]
fn test_routes_sharing_a_module_share_one_entry() {
    let table = Arc::new(FactoryTable::new());
    let (factory, _calls) = CountingFactory::new("ok");
    table.register("/srv/modules/app.so", factory);

    let ctx = ServerContext::builder()
        .module_prefix("/srv/modules")
        .loader(table)
        .route(
            "/a",
            RouteConfig {
                module_path: Some("app.so".into()),
                ..RouteConfig::default()
            },
        )
        .unwrap()
        .route(
            "/b",
            RouteConfig {
                module_path: Some("/srv/modules/app.so".into()),
                ..RouteConfig::default()
            },
        )
        .unwrap()
        .build();

    assert_eq!(ctx.registry().len(), 1);
    let indices: Vec<usize> = ctx
        .routes()
        .iter()
        .map(|(_, binding)| match binding.handler {
            HandlerBinding::Native { module } => module,
            HandlerBinding::Script { .. } => panic!("expected native binding"),
        })
        .collect();
    assert_eq!(indices, vec![0, 0]);
}
