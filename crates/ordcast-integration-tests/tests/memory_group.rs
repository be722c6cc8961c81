//! Groups of concurrently running processes over the in-memory network.

use std::time::Duration;

use ordcast_core::memory::{MemoryNetwork, MemoryTransport};
use ordcast_core::{
    BroadcastProcess, Error, Message, MessageId, Party, ProcessConfig, ProcessId, Result,
    Shutdown,
};
use ordcast_node::verify_agreement;
use tokio::task::JoinHandle;

type Outcome = (ProcessId, Result<Shutdown>, Vec<MessageId>);

fn spawn_group(network: &MemoryNetwork, size: u64) -> Vec<JoinHandle<Outcome>> {
    let party: Party = (1..=size).map(ProcessId).collect();
    party
        .members()
        .map(|id| {
            let (transport, mut inbox) = network.join(id, Duration::from_secs(1));
            let mut process: BroadcastProcess<MemoryTransport> =
                BroadcastProcess::new(ProcessConfig::new(id, party.clone()), transport).unwrap();
            tokio::spawn(async move {
                let outcome = process.run(&mut inbox).await;
                (id, outcome, process.delivered_log().to_vec())
            })
        })
        .collect()
}

fn submit(network: &MemoryNetwork, id: u64, payload: String) {
    let frame = Message::app_submission(ProcessId(id), 0, payload).encode();
    network.inject(ProcessId(id), frame).unwrap();
}

#[tokio::test(start_paused = true)]
async fn concurrent_group_agrees() {
    let network = MemoryNetwork::new();
    let handles = spawn_group(&network, 4);

    for round in 0..5 {
        for id in 1..=4 {
            submit(&network, id, format!("round-{round}-from-{id}"));
        }
        tokio::task::yield_now().await;
    }

    let mut logs = std::collections::BTreeMap::new();
    for handle in handles {
        let (id, outcome, delivered) = handle.await.unwrap();
        assert_eq!(outcome.unwrap(), Shutdown::Idle);
        logs.insert(id, delivered);
    }

    let agreement = verify_agreement(&logs).unwrap();
    assert_eq!(agreement.processes, 4);
    assert_eq!(agreement.delivered, 20);
}

#[tokio::test(start_paused = true)]
async fn unreachable_member_stops_its_peers() {
    let network = MemoryNetwork::new();
    let handles = spawn_group(&network, 3);
    network.sever(ProcessId(3));

    submit(&network, 1, "doomed".to_string());

    for handle in handles {
        let (id, outcome, delivered) = handle.await.unwrap();
        assert!(delivered.is_empty(), "process {id} delivered without a quorum");
        match (id.0, outcome) {
            (1 | 2, Err(Error::Send(e))) => assert_eq!(e.peer, ProcessId(3)),
            (3, Ok(shutdown)) => assert_eq!(shutdown, Shutdown::InboxClosed),
            (_, other) => panic!("process {id}: unexpected outcome {other:?}"),
        }
    }
}
