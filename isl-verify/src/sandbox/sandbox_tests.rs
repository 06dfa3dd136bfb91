use super::*;

fn registry() -> ModuleRegistry {
    ModuleRegistry::new()
        .with(
            "bank",
            "withdraw",
            target_fn(|args, sandbox| {
                let amount = args.get("amount").cloned().unwrap_or(Value::Integer(0));
                let balance = sandbox.store().field("balance").unwrap_or(Value::Integer(0));
                let (Value::Integer(b), Value::Integer(a)) = (&balance, &amount) else {
                    return Err(TargetError::new("INVALID", "non-integer balance"));
                };
                if a > b {
                    return Err(TargetError::new("INSUFFICIENT_FUNDS", "balance too low"));
                }
                sandbox.store().set_field("balance", Value::Integer(b - a));
                Ok(Value::record([("balance", Value::Integer(b - a))]))
            }),
        )
        .with("bank", "explode", target_fn(|_, _| panic!("boom")))
        .with(
            "bank",
            "stall",
            target_fn(|_, sandbox| {
                sandbox.store().set_field("partial", Value::Boolean(true));
                while !sandbox.is_cancelled() {
                    std::thread::sleep(Duration::from_millis(5));
                }
                Ok(Value::Nil)
            }),
        )
        .with(
            "bank",
            "late_write",
            target_fn(|_, sandbox| {
                std::thread::sleep(Duration::from_millis(200));
                sandbox.store().set_field("late", Value::Boolean(true));
                sandbox.store().put("Account", "ghost", Value::Nil);
                Ok(Value::Nil)
            }),
        )
        .with(
            "bank",
            "ignores_cancel",
            target_fn(|_, _| {
                std::thread::sleep(Duration::from_secs(3));
                Ok(Value::Nil)
            }),
        )
        .with(
            "bank",
            "ambient",
            target_fn(|_, sandbox| {
                let region = sandbox.env_var("REGION").unwrap_or_default();
                let _ = sandbox.now();
                Ok(Value::string(region))
            }),
        )
}

fn sandbox() -> Sandbox {
    Sandbox::new(Arc::new(registry()))
}

fn args(amount: i64) -> ValueMap {
    [("amount".to_string(), Value::Integer(amount))]
        .into_iter()
        .collect()
}

#[tokio::test]
async fn test_execute_returns_value_and_mutates_store() {
    let store = StateStore::new();
    store.set_field("balance", Value::Integer(100));
    let outcome = sandbox()
        .execute(&TargetRef::new("bank", "withdraw"), args(30), &store)
        .await
        .unwrap();

    assert!(outcome.succeeded());
    assert_eq!(
        outcome.return_value.unwrap().property("balance"),
        Value::Integer(70)
    );
    assert_eq!(store.field("balance"), Some(Value::Integer(70)));
}

#[tokio::test]
async fn test_thrown_error_is_captured() {
    let store = StateStore::new();
    store.set_field("balance", Value::Integer(10));
    let outcome = sandbox()
        .execute(&TargetRef::new("bank", "withdraw"), args(30), &store)
        .await
        .unwrap();

    match outcome.error {
        Some(ExecutionFailure::Thrown(e)) => assert_eq!(e.code, "INSUFFICIENT_FUNDS"),
        other => panic!("expected thrown error, got {:?}", other),
    }
    assert!(outcome.return_value.is_none());
}

#[tokio::test]
async fn test_panic_is_contained() {
    let outcome = sandbox()
        .execute(
            &TargetRef::new("bank", "explode"),
            ValueMap::new(),
            &StateStore::new(),
        )
        .await
        .unwrap();
    assert_eq!(
        outcome.error,
        Some(ExecutionFailure::Panicked {
            message: "boom".into()
        })
    );
}

#[tokio::test]
async fn test_timeout_keeps_partial_writes() {
    let store = StateStore::new();
    let target = TargetRef::new("bank", "stall").with_timeout(Duration::from_millis(50));
    let outcome = sandbox()
        .execute(&target, ValueMap::new(), &store)
        .await
        .unwrap();

    let err = outcome.error.unwrap();
    assert!(err.is_timeout());
    assert_eq!(
        err.to_string(),
        "Execution of 'bank::stall' timed out after 50ms"
    );
    assert_eq!(store.field("partial"), Some(Value::Boolean(true)));
}

#[tokio::test]
async fn test_writes_after_timeout_are_dropped() {
    let store = StateStore::new();
    let target = TargetRef::new("bank", "late_write").with_timeout(Duration::from_millis(50));
    let outcome = sandbox()
        .execute(&target, ValueMap::new(), &store)
        .await
        .unwrap();
    assert!(outcome.error.unwrap().is_timeout());

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(store.field("late"), None);
    assert_eq!(store.get("Account", "ghost"), None);
    assert!(store.take_effects().is_empty());
}

#[test]
fn test_runtime_shutdown_does_not_wait_for_stalled_target() {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();
    let target = TargetRef::new("bank", "ignores_cancel").with_timeout(Duration::from_millis(50));
    let outcome = rt
        .block_on(sandbox().execute(&target, ValueMap::new(), &StateStore::new()))
        .unwrap();
    assert!(outcome.error.unwrap().is_timeout());

    let start = Instant::now();
    drop(rt);
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_ambient_access_is_recorded() {
    let env = [("REGION".to_string(), "eu".to_string())].into_iter().collect();
    let outcome = sandbox()
        .with_env(env)
        .execute(
            &TargetRef::new("bank", "ambient"),
            ValueMap::new(),
            &StateStore::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.return_value, Some(Value::from("eu")));
    let expected: BTreeSet<_> = [EffectKind::Clock, EffectKind::Environment].into();
    assert_eq!(outcome.observed_effects, expected);
}

#[tokio::test]
async fn test_unresolvable_targets() {
    let store = StateStore::new();
    let missing_module = sandbox()
        .execute(&TargetRef::new("nope", "f"), ValueMap::new(), &store)
        .await;
    assert_eq!(
        missing_module.unwrap_err(),
        SandboxError::ModuleNotFound("nope".into())
    );

    let missing_export = sandbox()
        .execute(&TargetRef::new("bank", "deposit"), ValueMap::new(), &store)
        .await;
    assert!(matches!(
        missing_export,
        Err(SandboxError::ExportNotFound { .. })
    ));
}

#[test]
fn test_requires_async_runtime() {
    let result = futures::executor::block_on(sandbox().execute(
        &TargetRef::new("bank", "withdraw"),
        args(1),
        &StateStore::new(),
    ));
    assert_eq!(result.unwrap_err(), SandboxError::RuntimeUnavailable);
}

#[test]
fn test_relative_modules_resolve_against_project_root() {
    let target = TargetRef::new("./src/bank", "withdraw").with_project_root("/work");
    assert_eq!(target.resolved_module(), "/work/./src/bank");
    assert_eq!(TargetRef::new("bank", "x").resolved_module(), "bank");
}
