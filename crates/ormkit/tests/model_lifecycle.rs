use std::sync::Arc;

use asupersync::runtime::RuntimeBuilder;
use ormkit::prelude::*;
use ormkit::{CallbackErrorKind, FilterKey};

#[derive(Default)]
struct Account {
    id: Option<i64>,
    name: String,
    history: Vec<String>,
    fail_delete: bool,
}

impl Account {
    fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    fn log(&mut self, entry: &str) {
        self.history.push(entry.to_string());
    }
}

impl CallbackTarget for Account {
    fn call_method<'a>(&'a mut self, _cx: &'a Cx, method: &'a str) -> BoxFuture<'a, HookResult> {
        let out = match method {
            "normalize_name" => {
                self.name = self.name.trim().to_string();
                Ok(HookFlow::Continue)
            }
            "reject" => {
                self.log("reject");
                Ok(HookFlow::Halt)
            }
            "audit" => Err(Error::custom("audit log unavailable")),
            other => Err(Error::unknown_method("Account", other)),
        };
        Box::pin(std::future::ready(out))
    }

    fn halted_callback_hook(&mut self, filter: &FilterKey) {
        self.history.push(format!("halted by {filter}"));
    }
}

impl Persistence for Account {
    fn is_new_record(&self) -> bool {
        self.id.is_none()
    }

    fn validate<'a>(&'a mut self, _cx: &'a Cx) -> BoxFuture<'a, Result<bool>> {
        self.log("validate");
        let valid = !self.name.is_empty();
        Box::pin(std::future::ready(Ok(valid)))
    }

    fn insert<'a>(&'a mut self, _cx: &'a Cx) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.log("insert");
            self.id = Some(1);
            Ok(())
        })
    }

    fn update<'a>(&'a mut self, _cx: &'a Cx) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.log("update");
            Ok(())
        })
    }

    fn delete<'a>(&'a mut self, _cx: &'a Cx) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if self.fail_delete {
                return Err(Error::custom("row is locked"));
            }
            self.log("delete");
            Ok(())
        })
    }
}

fn logging(entry: impl Into<String>) -> Filter<Account> {
    let entry = entry.into();
    Filter::from_fn(move |a: &mut Account| {
        a.log(&entry);
        Ok(HookFlow::Continue)
    })
}

fn accounts() -> Lifecycle<Account> {
    let registry = Arc::new(CallbackRegistry::new());
    Lifecycle::define(registry, "Account").expect("define lifecycle")
}

fn register_tracing_hooks(lifecycle: &Lifecycle<Account>) {
    let registry = lifecycle.registry();
    let class = lifecycle.class();
    for chain in [VALIDATE, SAVE, CREATE, UPDATE, DESTROY] {
        registry.before(class, chain, logging(format!("before_{chain}"))).unwrap();
        registry.after(class, chain, logging(format!("after_{chain}"))).unwrap();
    }
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    rt.block_on(future)
}

fn expect_ok<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

#[test]
fn save_new_record_runs_create_inside_save() {
    let lifecycle = accounts();
    register_tracing_hooks(&lifecycle);
    let cx = Cx::for_testing();
    let mut account = Account::named("alice");

    let saved = expect_ok(block_on(lifecycle.save(&cx, &mut account)));

    assert!(saved);
    assert_eq!(account.id, Some(1));
    assert_eq!(
        account.history,
        vec![
            "before_validate",
            "validate",
            "after_validate",
            "before_save",
            "before_create",
            "insert",
            "after_create",
            "after_save",
        ]
    );
}

#[test]
fn save_existing_record_runs_update() {
    let lifecycle = accounts();
    register_tracing_hooks(&lifecycle);
    let cx = Cx::for_testing();
    let mut account = Account::named("bob");
    account.id = Some(7);

    assert!(expect_ok(block_on(lifecycle.save(&cx, &mut account))));
    assert_eq!(
        account.history,
        vec![
            "before_validate",
            "validate",
            "after_validate",
            "before_save",
            "before_update",
            "update",
            "after_update",
            "after_save",
        ]
    );
}

#[test]
fn invalid_model_is_not_saved() {
    let lifecycle = accounts();
    register_tracing_hooks(&lifecycle);
    lifecycle
        .registry()
        .before(lifecycle.class(), VALIDATE, "normalize_name")
        .unwrap();
    let cx = Cx::for_testing();
    let mut account = Account::named("   ");

    let saved = expect_ok(block_on(lifecycle.save(&cx, &mut account)));

    assert!(!saved);
    assert_eq!(account.id, None);
    // the false validation result also skips after-validate
    assert_eq!(account.history, vec!["before_validate", "validate"]);
}

#[test]
fn halt_in_nested_create_fails_save() {
    let lifecycle = accounts();
    register_tracing_hooks(&lifecycle);
    lifecycle
        .registry()
        .before(lifecycle.class(), CREATE, "reject")
        .unwrap();
    let cx = Cx::for_testing();
    let mut account = Account::named("carol");

    let saved = expect_ok(block_on(lifecycle.save(&cx, &mut account)));

    assert!(!saved);
    assert_eq!(account.id, None);
    assert_eq!(
        account.history,
        vec![
            "before_validate",
            "validate",
            "after_validate",
            "before_save",
            "before_create",
            "reject",
            "halted by reject",
        ]
    );
}

#[test]
fn error_in_nested_chain_reaches_caller() {
    let lifecycle = accounts();
    lifecycle
        .registry()
        .after(lifecycle.class(), CREATE, "audit")
        .unwrap();
    let cx = Cx::for_testing();
    let mut account = Account::named("dave");

    match block_on(lifecycle.save(&cx, &mut account)) {
        Outcome::Err(e) => assert_eq!(e.to_string(), "audit log unavailable"),
        _ => panic!("expected the audit error"),
    }
    // the insert already happened; the error only stops the remaining hooks
    assert_eq!(account.id, Some(1));
}

#[test]
fn valid_reports_validation_result() {
    let lifecycle = accounts();
    let cx = Cx::for_testing();

    let mut good = Account::named("erin");
    assert!(expect_ok(block_on(lifecycle.valid(&cx, &mut good))));

    let mut bad = Account::default();
    assert!(!expect_ok(block_on(lifecycle.valid(&cx, &mut bad))));
}

#[test]
fn destroy_runs_delete_between_hooks() {
    let lifecycle = accounts();
    register_tracing_hooks(&lifecycle);
    let cx = Cx::for_testing();
    let mut account = Account::named("frank");
    account.id = Some(3);

    assert!(expect_ok(block_on(lifecycle.destroy(&cx, &mut account))));
    assert_eq!(account.history, vec!["before_destroy", "delete", "after_destroy"]);
}

#[test]
fn destroy_failure_is_an_error() {
    let lifecycle = accounts();
    register_tracing_hooks(&lifecycle);
    let cx = Cx::for_testing();
    let mut account = Account::named("grace");
    account.fail_delete = true;

    let outcome = block_on(lifecycle.destroy(&cx, &mut account));
    assert!(matches!(outcome, Outcome::Err(Error::Custom(_))));
    assert_eq!(account.history, vec!["before_destroy"]);
}

#[test]
fn initialize_accepts_only_after_callbacks() {
    let lifecycle = accounts();
    let registry = lifecycle.registry();
    let class = lifecycle.class();

    match registry.before(class, INITIALIZE, logging("never")) {
        Err(Error::Callback(e)) => assert_eq!(e.kind, CallbackErrorKind::KindNotAllowed),
        _ => panic!("before-initialize must be rejected"),
    }
    registry.after(class, INITIALIZE, logging("initialized")).unwrap();

    let cx = Cx::for_testing();
    let mut account = Account::default();
    expect_ok(block_on(lifecycle.initialize(&cx, &mut account)));
    assert_eq!(account.history, vec!["initialized"]);
}

#[test]
fn subclass_inherits_lifecycle_chains() {
    let lifecycle = accounts();
    lifecycle
        .registry()
        .before(lifecycle.class(), SAVE, logging("base"))
        .unwrap();
    let premium = lifecycle.subclass("PremiumAccount").unwrap();
    premium
        .registry()
        .before(premium.class(), SAVE, logging("premium"))
        .unwrap();

    assert_eq!(
        premium.registry().chain_names(premium.class()).unwrap(),
        vec!["create", "destroy", "initialize", "save", "update", "validate"]
    );

    let cx = Cx::for_testing();
    let mut account = Account::named("heidi");
    assert!(expect_ok(block_on(premium.save(&cx, &mut account))));
    assert_eq!(account.history, vec!["validate", "base", "premium", "insert"]);

    let mut plain = Account::named("ivan");
    assert!(expect_ok(block_on(lifecycle.save(&cx, &mut plain))));
    assert_eq!(plain.history, vec!["validate", "base", "insert"]);
}
