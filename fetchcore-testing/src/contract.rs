//! Behavioral contract of a loader running over a transport decorator.
//!
//! Each `test_*` function drives a fresh loader over a [`ScriptedTransport`]
//! wrapped by the caller, and reports the first violated expectation as a
//! [`ContractTestFailure`].

use crate::assertions::{assert_consistent, assert_superseded_never_published};
use crate::collector::StateCollector;
use crate::scripted::{Reply, ScriptedTransport};
use fetchcore::{ErrorKind, LoaderError, ResourceLoader, ResourceState, Transport};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Key type used by every contract scenario.
pub type ContractKey = String;

/// Resource type used by every contract scenario.
pub type ContractValue = u32;

/// The scripted transport handed to the decorator under test.
pub type ContractTransport = ScriptedTransport<ContractKey, ContractValue>;

const SETTLE_TIMEOUT: Duration = Duration::from_secs(2);

/// A contract scenario that did not hold, with the scenario name.
#[derive(Debug)]
pub struct ContractTestFailure {
    scenario: &'static str,
    detail: String,
}

impl ContractTestFailure {
    fn new(scenario: &'static str, detail: impl Into<String>) -> Self {
        Self {
            scenario,
            detail: detail.into(),
        }
    }

    fn loader_error(scenario: &'static str, operation: &'static str, error: &LoaderError) -> Self {
        Self::new(
            scenario,
            format!("{operation} returned unexpected error: {error}"),
        )
    }

    fn unexpected_state(
        scenario: &'static str,
        expected: &str,
        actual: &ResourceState<ContractKey, ContractValue>,
    ) -> Self {
        Self::new(
            scenario,
            format!("expected {expected} but the loader is in {actual:?}"),
        )
    }
}

impl fmt::Display for ContractTestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.scenario, self.detail)
    }
}

impl std::error::Error for ContractTestFailure {}

/// Outcome of one contract scenario.
pub type ContractTestResult = Result<(), ContractTestFailure>;

struct Harness<Tr>
where
    Tr: Transport<ContractKey, ContractValue>,
{
    scripted: ContractTransport,
    collector: Arc<StateCollector<ContractKey, ContractValue>>,
    loader: ResourceLoader<ContractKey, ContractValue, Tr>,
}

impl<Tr> Harness<Tr>
where
    Tr: Transport<ContractKey, ContractValue>,
{
    fn new<F>(wrap: F, script: impl FnOnce(&ContractTransport)) -> Self
    where
        F: FnOnce(ContractTransport) -> Tr,
    {
        let scripted = ContractTransport::new();
        script(&scripted);

        let collector = Arc::new(StateCollector::new());
        let loader = ResourceLoader::builder(wrap(scripted.clone()))
            .hook(collector.clone())
            .build();

        Self {
            scripted,
            collector,
            loader,
        }
    }

    async fn settled(
        &self,
        scenario: &'static str,
    ) -> Result<ResourceState<ContractKey, ContractValue>, ContractTestFailure> {
        match tokio::time::timeout(SETTLE_TIMEOUT, self.loader.settled()).await {
            Ok(Ok(state)) => Ok(state),
            Ok(Err(error)) => Err(ContractTestFailure::loader_error(scenario, "settled", &error)),
            Err(_) => Err(ContractTestFailure::new(
                scenario,
                format!("loader did not settle within {SETTLE_TIMEOUT:?}"),
            )),
        }
    }
}

fn key(raw: &str) -> ContractKey {
    raw.to_string()
}

fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

/// First observation publishes `Loading` and then the successful outcome.
pub async fn test_success_settles<F, Tr>(wrap: F) -> ContractTestResult
where
    F: FnOnce(ContractTransport) -> Tr,
    Tr: Transport<ContractKey, ContractValue>,
{
    const SCENARIO: &str = "success_settles";

    let harness = Harness::new(wrap, |scripted| {
        scripted.script(key("posts"), Reply::ok(1).after(millis(10)));
    });

    let initial = harness.loader.observe(key("posts"));
    if initial != (ResourceState::Loading { key: key("posts") }) {
        return Err(ContractTestFailure::unexpected_state(
            SCENARIO,
            "Loading(posts) from observe",
            &initial,
        ));
    }

    let settled = harness.settled(SCENARIO).await?;
    let expected = ResourceState::Success {
        key: key("posts"),
        data: 1,
    };
    if settled != expected {
        return Err(ContractTestFailure::unexpected_state(
            SCENARIO,
            "Success(posts, 1)",
            &settled,
        ));
    }

    let published = harness.collector.states();
    if published != [initial, expected] {
        return Err(ContractTestFailure::new(
            SCENARIO,
            format!("expected exactly Loading then Success, got {published:?}"),
        ));
    }

    Ok(())
}

/// A slow response for an earlier key never overwrites a later key.
pub async fn test_last_key_wins<F, Tr>(wrap: F) -> ContractTestResult
where
    F: FnOnce(ContractTransport) -> Tr,
    Tr: Transport<ContractKey, ContractValue>,
{
    const SCENARIO: &str = "last_key_wins";

    let harness = Harness::new(wrap, |scripted| {
        scripted.script(key("slow"), Reply::ok(1).after(millis(60)));
        scripted.script(key("fast"), Reply::ok(2).after(millis(5)));
    });

    let _ = harness.loader.observe(key("slow"));
    let _ = harness.loader.observe(key("fast"));

    let settled = harness.settled(SCENARIO).await?;
    let expected = ResourceState::Success {
        key: key("fast"),
        data: 2,
    };
    if settled != expected {
        return Err(ContractTestFailure::unexpected_state(
            SCENARIO,
            "Success(fast, 2)",
            &settled,
        ));
    }

    // Give the slow response time to arrive and be discarded.
    tokio::time::sleep(millis(120)).await;

    let current = harness.loader.state();
    if current != expected {
        return Err(ContractTestFailure::unexpected_state(
            SCENARIO,
            "Success(fast, 2) after the slow response arrived",
            &current,
        ));
    }

    let published = harness.collector.states();
    assert_consistent(&published);
    assert_superseded_never_published(&published, &key("slow"));

    Ok(())
}

/// Nothing is published after dispose, even when the response arrives.
pub async fn test_dispose_silences<F, Tr>(wrap: F) -> ContractTestResult
where
    F: FnOnce(ContractTransport) -> Tr,
    Tr: Transport<ContractKey, ContractValue>,
{
    const SCENARIO: &str = "dispose_silences";

    let mut gate = None;
    let harness = Harness::new(wrap, |scripted| {
        gate = Some(scripted.gate(key("held"), Reply::ok(1)));
    });
    let gate = gate.ok_or_else(|| ContractTestFailure::new(SCENARIO, "gate was not scripted"))?;

    let _ = harness.loader.observe(key("held"));
    harness.loader.dispose();
    gate.open();
    tokio::time::sleep(millis(30)).await;

    let published = harness.collector.states();
    if published != [ResourceState::Loading { key: key("held") }] {
        return Err(ContractTestFailure::new(
            SCENARIO,
            format!("expected only Loading(held) to be published, got {published:?}"),
        ));
    }

    match harness.loader.settled().await {
        Err(LoaderError::Disposed(_)) => Ok(()),
        other => Err(ContractTestFailure::new(
            SCENARIO,
            format!("settled() after dispose returned {other:?}"),
        )),
    }
}

/// Observing a loading or loaded key again issues no new request.
pub async fn test_same_key_is_idempotent<F, Tr>(wrap: F) -> ContractTestResult
where
    F: FnOnce(ContractTransport) -> Tr,
    Tr: Transport<ContractKey, ContractValue>,
{
    const SCENARIO: &str = "same_key_is_idempotent";

    let harness = Harness::new(wrap, |scripted| {
        scripted.script(key("same"), Reply::ok(3).after(millis(5)));
    });

    let first = harness.loader.observe(key("same"));
    let second = harness.loader.observe(key("same"));
    if first != second {
        return Err(ContractTestFailure::unexpected_state(
            SCENARIO,
            "the same Loading state from a repeated observe",
            &second,
        ));
    }

    let settled = harness.settled(SCENARIO).await?;
    let again = harness.loader.observe(key("same"));
    if again != settled {
        return Err(ContractTestFailure::unexpected_state(
            SCENARIO,
            "the settled state to be returned unchanged",
            &again,
        ));
    }

    let calls = harness.scripted.calls_for(&key("same"));
    if calls != 1 {
        return Err(ContractTestFailure::new(
            SCENARIO,
            format!("expected exactly one transport call, got {calls}"),
        ));
    }

    let published = harness.collector.len();
    if published != 2 {
        return Err(ContractTestFailure::new(
            SCENARIO,
            format!("expected two published states, got {published}"),
        ));
    }

    Ok(())
}

/// A failed fetch surfaces as `Error` with the transport's message and kind.
pub async fn test_error_surfaces<F, Tr>(wrap: F) -> ContractTestResult
where
    F: FnOnce(ContractTransport) -> Tr,
    Tr: Transport<ContractKey, ContractValue>,
{
    const SCENARIO: &str = "error_surfaces";

    let harness = Harness::new(wrap, |scripted| {
        scripted.script(
            key("broken"),
            Reply::err_with(ErrorKind::Response(500), "boom").after(millis(5)),
        );
    });

    let _ = harness.loader.observe(key("broken"));
    let settled = harness.settled(SCENARIO).await?;

    let Some(error) = settled.error() else {
        return Err(ContractTestFailure::unexpected_state(
            SCENARIO,
            "Error(broken)",
            &settled,
        ));
    };

    if !error.message().contains("boom") {
        return Err(ContractTestFailure::new(
            SCENARIO,
            format!("error message {:?} does not mention the cause", error.message()),
        ));
    }

    if error.kind() != ErrorKind::Response(500) {
        return Err(ContractTestFailure::new(
            SCENARIO,
            format!("expected kind Response(500), got {:?}", error.kind()),
        ));
    }

    if settled.data().is_some() {
        return Err(ContractTestFailure::unexpected_state(
            SCENARIO,
            "no data alongside the error",
            &settled,
        ));
    }

    Ok(())
}

/// Observing a key again after its fetch failed retries it once.
pub async fn test_failed_key_is_retried<F, Tr>(wrap: F) -> ContractTestResult
where
    F: FnOnce(ContractTransport) -> Tr,
    Tr: Transport<ContractKey, ContractValue>,
{
    const SCENARIO: &str = "failed_key_is_retried";

    let harness = Harness::new(wrap, |scripted| {
        scripted
            .script(key("flaky"), Reply::err("offline").after(millis(5)))
            .script(key("flaky"), Reply::ok(8).after(millis(5)));
    });

    let _ = harness.loader.observe(key("flaky"));
    let failed = harness.settled(SCENARIO).await?;
    if failed.error().is_none() {
        return Err(ContractTestFailure::unexpected_state(
            SCENARIO,
            "Error(flaky) from the first attempt",
            &failed,
        ));
    }

    let retry = harness.loader.observe(key("flaky"));
    let repeated = harness.loader.observe(key("flaky"));
    if !retry.is_loading() || repeated != retry {
        return Err(ContractTestFailure::unexpected_state(
            SCENARIO,
            "one new Loading(flaky) cycle",
            &repeated,
        ));
    }

    let recovered = harness.settled(SCENARIO).await?;
    let expected = ResourceState::Success {
        key: key("flaky"),
        data: 8,
    };
    if recovered != expected {
        return Err(ContractTestFailure::unexpected_state(
            SCENARIO,
            "Success(flaky, 8) after the retry",
            &recovered,
        ));
    }

    let calls = harness.scripted.calls_for(&key("flaky"));
    if calls != 2 {
        return Err(ContractTestFailure::new(
            SCENARIO,
            format!("expected two transport calls, got {calls}"),
        ));
    }

    assert_consistent(&harness.collector.states());
    Ok(())
}

/// Runs the loader contract against a transport decorator.
///
/// `wrap_transport` receives the scripted transport driving each scenario and
/// returns the transport the loader should use. Pass `|transport| transport`
/// to check the loader alone.
///
/// ```ignore
/// fetchcore_testing::loader_contract_tests! {
///     suite = with_timeout,
///     wrap_transport = |transport| transport.with_timeout(FetchTimeoutMs::try_new(1_000).unwrap()),
/// }
/// ```
#[macro_export]
macro_rules! loader_contract_tests {
    (suite = $suite:ident, wrap_transport = $wrap:expr $(,)?) => {
        #[allow(non_snake_case)]
        mod $suite {
            #[allow(unused_imports)]
            use super::*;
            use $crate::contract::{
                test_dispose_silences, test_error_surfaces, test_failed_key_is_retried,
                test_last_key_wins, test_same_key_is_idempotent, test_success_settles,
            };

            #[tokio::test(flavor = "multi_thread")]
            async fn success_settles_contract() {
                test_success_settles($wrap)
                    .await
                    .expect("loader contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn last_key_wins_contract() {
                test_last_key_wins($wrap)
                    .await
                    .expect("loader contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn dispose_silences_contract() {
                test_dispose_silences($wrap)
                    .await
                    .expect("loader contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn same_key_is_idempotent_contract() {
                test_same_key_is_idempotent($wrap)
                    .await
                    .expect("loader contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn error_surfaces_contract() {
                test_error_surfaces($wrap)
                    .await
                    .expect("loader contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn failed_key_is_retried_contract() {
                test_failed_key_is_retried($wrap)
                    .await
                    .expect("loader contract failed");
            }
        }
    };
}

pub use loader_contract_tests;
