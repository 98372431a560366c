//! Cache short-circuiting and storage of sibling outputs.

use ldict::persistence::{Cache, DiskCache, MemoryCache};
use ldict::{ldict, Config, Function, Ldict, LdictError};
use serde_json::json;
use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;
use tempfile::TempDir;

fn split(calls: Rc<Cell<usize>>) -> Rc<Function> {
    Function::builder("split")
        .input("x")
        .outputs(["lo", "hi"])
        .code("lo, hi = x - 1, x + 1")
        .build(move |args| {
            calls.set(calls.get() + 1);
            let x = args.i64("x")?;
            Ok(json!({"lo": x - 1, "hi": x + 1}))
        })
        .unwrap()
}

#[test]
fn test_miss_then_hit_skips_function() {
    let cache = Arc::new(MemoryCache::new());
    let calls = Rc::new(Cell::new(0));
    let base = ldict! {x: 10}.unwrap();

    let first = (&(&base >> &split(calls.clone())).unwrap() >> cache.clone()).unwrap();
    let id_before = first.id();
    assert_eq!(*first.get("lo").unwrap(), json!(9));
    assert_eq!(calls.get(), 1);
    assert_eq!(first.id(), id_before);
    // Both siblings were stored on the miss.
    assert_eq!(cache.len(), 2);
    assert!(cache.contains(&first.field_hosh("hi").unwrap().id()).unwrap());

    let second = (&(&base >> &split(calls.clone())).unwrap() >> cache.clone()).unwrap();
    assert_eq!(second.id(), first.id());
    assert_eq!(*second.get("hi").unwrap(), json!(11));
    assert_eq!(*second.get("lo").unwrap(), json!(9));
    assert_eq!(calls.get(), 1, "cache hit must not run the function");
}

#[test]
fn test_hit_is_not_promoted_to_earlier_caches() {
    let front = Arc::new(MemoryCache::new());
    let back = Arc::new(MemoryCache::new());
    let calls = Rc::new(Cell::new(0));
    let base = ldict! {x: 1}.unwrap();

    let warm = (&(&base >> &split(calls.clone())).unwrap() >> back.clone()).unwrap();
    warm.evaluate().unwrap();
    assert_eq!(back.len(), 2);

    let caches: Vec<Arc<dyn Cache>> = vec![front.clone(), back.clone()];
    let d = (&(&base >> &split(calls.clone())).unwrap() >> caches).unwrap();
    assert_eq!(*d.get("hi").unwrap(), json!(2));
    assert_eq!(calls.get(), 1);
    assert!(front.is_empty());
}

#[test]
fn test_disk_cache_survives_process_state() {
    let dir = TempDir::new().unwrap();
    let calls = Rc::new(Cell::new(0));
    let base = ldict! {x: 5}.unwrap();
    {
        let disk = Arc::new(DiskCache::open(dir.path()).unwrap());
        let d = (&(&base >> &split(calls.clone())).unwrap() >> disk).unwrap();
        d.evaluate().unwrap();
    }
    let disk = Arc::new(DiskCache::open(dir.path()).unwrap());
    assert_eq!(disk.len().unwrap(), 2);
    let d = (&(&base >> &split(calls.clone())).unwrap() >> disk).unwrap();
    assert_eq!(*d.get("lo").unwrap(), json!(4));
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_uncoded_functions_do_not_share_cache_entries() {
    let cache = Arc::new(MemoryCache::new());
    let inc = Function::builder("inc")
        .input("x")
        .output("y")
        .build(|args| Ok(json!({"y": args.i64("x")? + 1})))
        .unwrap();
    let dbl = Function::builder("dbl")
        .input("x")
        .output("y")
        .build(|args| Ok(json!({"y": args.i64("x")? * 2})))
        .unwrap();
    let base = ldict! {x: 10}.unwrap();

    let a = (&(&base >> &inc).unwrap() >> cache.clone()).unwrap();
    assert_eq!(*a.get("y").unwrap(), json!(11));
    let b = (&(&base >> &dbl).unwrap() >> cache.clone()).unwrap();
    assert_eq!(*b.get("y").unwrap(), json!(20));
    assert_eq!(cache.len(), 2);
}

#[test]
fn test_empty_cache_list_uses_configured_default() {
    let cache = Arc::new(MemoryCache::new());
    let config = Config::default().with_cache(cache.clone());
    let calls = Rc::new(Cell::new(0));
    let base = Ldict::with_config(config).insert("x", json!(2)).unwrap();

    let d = (&(&base >> &split(calls)).unwrap() >> Vec::<Arc<dyn Cache>>::new()).unwrap();
    d.evaluate().unwrap();
    assert_eq!(cache.len(), 2);

    let none = ldict! {x: 2}.unwrap();
    let err = (&none >> Vec::<Arc<dyn Cache>>::new()).unwrap_err();
    assert!(matches!(err, LdictError::Cache(_)));
}

#[test]
fn test_values_are_stored_as_envelopes() {
    let cache = Arc::new(MemoryCache::new());
    let base = ldict! {x: 3}.unwrap();
    let d = (&(&base >> &split(Rc::new(Cell::new(0)))).unwrap() >> cache.clone()).unwrap();
    d.evaluate().unwrap();
    let key = d.field_hosh("lo").unwrap().id();
    let bytes = cache.get(&key).unwrap().unwrap();
    assert_eq!(&bytes[..4], ldict::compression::MAGIC);
}
