use fetchcore::{ErrorKind, ResourceLoader, ResourceState};
use fetchcore_testing::chaos::{ChaosConfig, ChaosTransportExt};
use fetchcore_testing::{eventually, Reply, ScriptedTransport, StateCollector};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn chaos_mode_failure_surfaces_as_network_error() {
    // Given: deterministic chaos forcing every fetch to fail
    let scripted = ScriptedTransport::new();
    scripted.script("posts", Reply::ok(vec![1_u32, 2]));
    let loader: ResourceLoader<&str, Vec<u32>, _> = ResourceLoader::new(
        scripted
            .clone()
            .with_chaos(ChaosConfig::deterministic().with_failure_probability(1.0)),
    );

    // When: the loader observes a key
    let _ = loader.observe("posts");
    let state = loader.settled().await.expect("cycle settles");

    // Then: the injected failure is published and the scripted reply was never requested
    let error = state.error().expect("failure published");
    assert_eq!(error.kind(), ErrorKind::Network);
    assert_eq!(error.message(), "injected transport failure");
    assert_eq!(scripted.call_count(), 0);
}

#[tokio::test]
async fn chaos_mode_failure_is_recoverable_through_refetch() {
    // Given: chaos that fails roughly half of all fetches with a fixed seed
    let scripted = ScriptedTransport::new();
    scripted.script("feed", Reply::ok(10_u32));
    let collector = Arc::new(StateCollector::new());
    let loader = ResourceLoader::<&str, u32, _>::builder(
        scripted.with_chaos(ChaosConfig::seeded(3).with_failure_probability(0.5)),
    )
    .hook(collector.clone())
    .build();

    // When: the consumer keeps refetching until a fetch succeeds
    let _ = loader.observe("feed");
    let mut state = loader.settled().await.expect("cycle settles");
    for _ in 0..64 {
        if state.data().is_some() {
            break;
        }
        let _ = loader.refetch().expect("loader is observing");
        state = loader.settled().await.expect("cycle settles");
    }

    // Then: the success is published and every published outcome followed its own Loading
    assert_eq!(state, ResourceState::Success { key: "feed", data: 10 });
    fetchcore_testing::assert_consistent(&collector.states());
}

#[tokio::test(start_paused = true)]
async fn render_loop_recovers_from_chaos_by_observing_again() {
    // Given: jittered chaos failing about half of all fetches
    let scripted = ScriptedTransport::new();
    scripted.script("feed", Reply::ok(4_u32));
    let collector = Arc::new(StateCollector::new());
    let loader = ResourceLoader::<&str, u32, _>::builder(
        scripted.clone().with_chaos(
            ChaosConfig::seeded(11)
                .with_failure_probability(0.5)
                .with_latency_jitter(Duration::from_millis(20)),
        ),
    )
    .hook(collector.clone())
    .build();

    // When: the consumer observes the key on every frame, as a render loop would
    let recovered = eventually(Duration::from_secs(5), || {
        loader.observe("feed").data().is_some()
    })
    .await;

    // Then: a failed cycle was retried by observing again until one succeeded
    assert!(recovered.is_ok(), "feed never recovered: {recovered:?}");
    assert_eq!(loader.state(), ResourceState::Success { key: "feed", data: 4 });
    fetchcore_testing::assert_consistent(&collector.states());
}
