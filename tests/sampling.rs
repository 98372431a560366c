//! Parameter sampling through containers.

use ldict::parameter::{Domain, ParamDefault, Sampler};
use ldict::{ldict, Function, Ldict, LdictError, Let};
use serde_json::json;
use std::rc::Rc;

fn affine() -> Rc<Function> {
    Function::builder("affine")
        .input("x")
        .param("a", ParamDefault::from_value(json!([1, 2, 3, "...", 10])).unwrap())
        .param("b", ParamDefault::from_value(json!([0.00001, 0.0001, 0.001, "...", 100000])).unwrap())
        .output("y")
        .code("y = a * x + b")
        .build(|args| Ok(json!({"y": args.f64("a")? * args.f64("x")? + args.f64("b")?})))
        .unwrap()
}

fn sampled(seed: u64) -> Ldict {
    let d = (ldict! {x: 3}.unwrap() >> Sampler::seeded(seed)).unwrap();
    (&d >> &affine()).unwrap()
}

#[test]
fn test_same_seed_same_identity_and_values() {
    let a = sampled(0);
    let b = sampled(0);
    assert_eq!(a.id(), b.id());
    assert_eq!(a.get("y").unwrap(), b.get("y").unwrap());
}

#[test]
fn test_different_seeds_differ() {
    let wide = || Domain::parse(&json!([1, 2, 3, "...", 100000])).unwrap();
    let draw = |seed: u64| {
        let d = (ldict! {x: 1}.unwrap() >> Sampler::seeded(seed)).unwrap();
        (&d >> Let::new(&affine()).sample("a", wide()).with("b", 0)).unwrap()
    };
    let one = draw(1);
    let two = draw(2);
    assert_ne!(one.id(), two.id());
    assert_ne!(one.get("y").unwrap(), two.get("y").unwrap());
    assert_eq!(draw(1).id(), one.id());
}

#[test]
fn test_sampling_without_sampler_fails() {
    let d = ldict! {x: 3}.unwrap();
    match &d >> &affine() {
        Err(LdictError::UndefinedSeed(name)) => assert_eq!(name, "a"),
        other => panic!("expected UndefinedSeed, got {other:?}"),
    }
}

#[test]
fn test_explicit_values_skip_sampling() {
    let d = ldict! {x: 3}.unwrap();
    let e = (&d >> Let::new(&affine()).with("a", 2).with("b", 0.5)).unwrap();
    assert_eq!(*e.get("y").unwrap(), json!(6.5));
}

#[test]
fn test_shared_sampler_advances_along_chain() {
    let sampler = Sampler::seeded(42);
    let d = (ldict! {x: 3}.unwrap() >> sampler.clone()).unwrap();
    let draws: Vec<String> = (0..20)
        .map(|_| (&d >> &affine()).unwrap().id())
        .collect();
    let distinct: std::collections::HashSet<_> = draws.iter().collect();
    assert!(distinct.len() > 1, "sampler should advance between applications");
    assert!(d.sampler().unwrap().same_as(&sampler));
}

#[test]
fn test_domain_override_for_one_application() {
    let d = (ldict! {x: 3}.unwrap() >> Sampler::seeded(1)).unwrap();
    let only_seven = Domain::parse(&json!([7])).unwrap();
    let e = (&d >> Let::new(&affine()).sample("a", only_seven).with("b", 0)).unwrap();
    assert_eq!(*e.get("y").unwrap(), json!(21.0));
}

#[test]
fn test_sampled_value_is_in_domain() {
    for seed in 0..10 {
        let d = (ldict! {x: 1}.unwrap() >> Sampler::seeded(seed)).unwrap();
        let e = (&d >> Let::new(&affine()).with("b", 0)).unwrap();
        let y = e.get("y").unwrap().as_f64().unwrap();
        assert!((1.0..=10.0).contains(&y));
        assert_eq!(y.fract(), 0.0);
    }
}

#[test]
fn test_chain_takes_sampler_of_other() {
    let a = ldict! {x: 3}.unwrap();
    let b = (ldict! {y: 1}.unwrap() >> Sampler::seeded(3)).unwrap();
    let c = (&a >> &b).unwrap();
    assert!(c.sampler().is_some());
}

#[test]
fn test_inconsistent_domain_rejected_at_declaration() {
    let err = ParamDefault::from_value(json!([1, 2, 5, "...", 10])).unwrap_err();
    assert!(matches!(err, LdictError::InconsistentLange(_)));
}
