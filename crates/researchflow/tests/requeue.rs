mod common;

use common::{job_json, single_agent_harness, status_of, Reply, ScriptedAgent, DELAYED, QUEUE};
use researchflow::jobs::epoch_seconds;
use researchflow::jobs::RanJob;
use researchflow::store::TaskStore;
use serde_json::json;

#[tokio::test]
async fn due_members_move_back_to_the_live_queue_in_score_order() {
    let agent = ScriptedAgent::new("any", vec![Reply::Records(json!([]))]);
    let h = single_agent_harness(agent);

    let now = epoch_seconds();
    let first = job_json("due-1", json!({"query": "a"})).to_string();
    let second = job_json("due-2", json!({"query": "b"})).to_string();
    let future = job_json("later", json!({"query": "c"})).to_string();

    h.store.delay_add(DELAYED, &first, now - 5.0).await.unwrap();
    h.store.delay_add(DELAYED, &second, now - 1.0).await.unwrap();
    h.store.delay_add(DELAYED, &future, now + 500.0).await.unwrap();

    // one iteration requeues both due members and pops the first of them
    assert_eq!(h.dispatcher.run_once().await.unwrap(), RanJob::Worked);
    assert!(status_of(&h.store, "due-1").await.is_some());

    // the second due member is next on the live queue
    let next = h
        .store
        .pop(QUEUE, common::POP_TIMEOUT)
        .await
        .unwrap()
        .expect("second due member on the queue");
    assert_eq!(next, second);

    // the future member stays scheduled
    let left = h.store.delayed_due(DELAYED, now + 600.0).await.unwrap();
    assert_eq!(left, vec![future]);
}

#[tokio::test]
async fn requeue_moves_each_member_exactly_once() {
    let agent = ScriptedAgent::new("any", vec![Reply::Records(json!([]))]);
    let h = single_agent_harness(agent.clone());

    let raw = job_json("once", json!({"query": "a"})).to_string();
    h.store
        .delay_add(DELAYED, &raw, epoch_seconds() - 2.0)
        .await
        .unwrap();

    assert_eq!(h.dispatcher.run_once().await.unwrap(), RanJob::Worked);
    assert_eq!(agent.calls(), 1);

    // second iteration finds nothing: no duplicate push, no leftover member
    assert_eq!(h.dispatcher.run_once().await.unwrap(), RanJob::Idle);
    assert_eq!(agent.calls(), 1);
    let left = h
        .store
        .delayed_due(DELAYED, epoch_seconds() + 3600.0)
        .await
        .unwrap();
    assert!(left.is_empty());
}

#[tokio::test]
async fn iteration_with_nothing_queued_idles_after_the_pop_wait() {
    let agent = ScriptedAgent::new("any", vec![Reply::Records(json!([]))]);
    let h = single_agent_harness(agent);

    let started = std::time::Instant::now();
    assert_eq!(h.dispatcher.run_once().await.unwrap(), RanJob::Idle);
    let elapsed = started.elapsed();
    assert!(elapsed >= common::POP_TIMEOUT, "pop returned before the wait elapsed");
    assert!(elapsed < std::time::Duration::from_secs(2));
}
