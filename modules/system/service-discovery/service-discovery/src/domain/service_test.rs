#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use service_discovery_sdk::{Node, NodeState, RegisterNodeRequest};
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    use error::DomainError;
    use extractor::{HealthUpdate, SweepBatch};

    // In-memory repository; writes for ids in `failing` are rejected.
    #[derive(Default)]
    struct MockRepository {
        nodes: Mutex<HashMap<Uuid, Node>>,
        failing: Mutex<HashSet<Uuid>>,
    }

    #[async_trait]
    impl repo::NodesRepository for MockRepository {
        async fn get_all(&self) -> anyhow::Result<Vec<Node>> {
            Ok(self.nodes.lock().values().cloned().collect())
        }

        async fn get(&self, id: Uuid) -> anyhow::Result<Option<Node>> {
            Ok(self.nodes.lock().get(&id).cloned())
        }

        async fn add_or_update(&self, node: &Node) -> anyhow::Result<()> {
            if self.failing.lock().contains(&node.id) {
                anyhow::bail!("disk full");
            }
            self.nodes.lock().insert(node.id, node.clone());
            Ok(())
        }

        async fn remove(&self, id: Uuid) -> anyhow::Result<()> {
            self.nodes.lock().remove(&id);
            Ok(())
        }
    }

    struct MockExtractor {
        rx: Mutex<Option<mpsc::Receiver<HealthUpdate>>>,
    }

    #[async_trait]
    impl extractor::HealthUpdatesExtractor for MockExtractor {
        async fn start(&self, cancel: CancellationToken) -> Result<(), DomainError> {
            cancel.cancelled().await;
            Err(DomainError::Cancelled)
        }

        fn out(&self) -> Option<mpsc::Receiver<HealthUpdate>> {
            self.rx.lock().take()
        }
    }

    #[derive(Default)]
    struct RecordingGateway {
        sent: Mutex<Vec<(Node, Vec<Uuid>)>>,
    }

    #[async_trait]
    impl gateway::NodeUpdatesGateway for RecordingGateway {
        async fn start(&self, cancel: CancellationToken) -> Result<(), DomainError> {
            cancel.cancelled().await;
            Err(DomainError::Cancelled)
        }

        async fn send(&self, update: &Node, receivers: &[Node]) -> Result<(), DomainError> {
            let ids = receivers.iter().map(|n| n.id).collect();
            self.sent.lock().push((update.clone(), ids));
            Ok(())
        }
    }

    struct Harness {
        repo: Arc<MockRepository>,
        gateway: Arc<RecordingGateway>,
        updates: mpsc::Sender<HealthUpdate>,
        service: Arc<service::DiscoveryService>,
    }

    fn harness() -> Harness {
        let repo = Arc::new(MockRepository::default());
        let gateway = Arc::new(RecordingGateway::default());
        let (updates, rx) = mpsc::channel(8);
        let extractor = Arc::new(MockExtractor {
            rx: Mutex::new(Some(rx)),
        });
        let service = Arc::new(service::DiscoveryService::new(
            repo.clone(),
            extractor,
            gateway.clone(),
        ));
        Harness {
            repo,
            gateway,
            updates,
            service,
        }
    }

    fn request(service: &str, host: &str) -> RegisterNodeRequest {
        RegisterNodeRequest {
            hostname: host.to_owned(),
            service_name: service.to_owned(),
            health_endpoint: format!("http://{host}/health"),
            upd_endpoint: format!("http://{host}/updates"),
            meta: HashMap::new(),
        }
    }

    async fn wait_for<F: Fn() -> bool>(cond: F) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_register_assigns_unique_ids_and_up_state() {
        let h = harness();
        let mut ids = HashSet::new();
        for i in 0..20 {
            let node = h
                .service
                .register(request("svc", &format!("host-{i}")))
                .await
                .unwrap();
            assert_eq!(node.state, NodeState::Up);
            assert!(ids.insert(node.id));
        }
        assert_eq!(h.repo.nodes.lock().len(), 20);
    }

    #[tokio::test]
    async fn test_register_rejects_invalid_requests() {
        let h = harness();

        let mut bad = request("svc", "a");
        bad.hostname = " ".to_owned();
        assert!(matches!(
            h.service.register(bad).await,
            Err(DomainError::Validation(msg)) if msg.contains("hostname")
        ));

        let mut bad = request("", "a");
        bad.service_name.clear();
        assert!(matches!(
            h.service.register(bad).await,
            Err(DomainError::Validation(msg)) if msg.contains("service_name")
        ));

        let mut bad = request("svc", "a");
        bad.health_endpoint = "not a url".to_owned();
        assert!(matches!(
            h.service.register(bad).await,
            Err(DomainError::Validation(msg)) if msg.contains("health_endpoint")
        ));

        let mut bad = request("svc", "a");
        bad.upd_endpoint = "ftp://a/updates".to_owned();
        assert!(matches!(
            h.service.register(bad).await,
            Err(DomainError::Validation(msg)) if msg.contains("upd_endpoint")
        ));

        assert!(h.repo.nodes.lock().is_empty());
    }

    #[tokio::test]
    async fn test_list_nodes_filters_by_service() {
        let h = harness();
        h.service.register(request("billing", "a")).await.unwrap();
        h.service.register(request("billing", "b")).await.unwrap();
        h.service.register(request("search", "c")).await.unwrap();

        assert_eq!(h.service.list_nodes("").await.unwrap().len(), 3);
        let billing = h.service.list_nodes("billing").await.unwrap();
        assert_eq!(billing.len(), 2);
        assert!(billing.iter().all(|n| n.service_name == "billing"));
        assert!(h.service.list_nodes("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deregister_removes_node() {
        let h = harness();
        let node = h.service.register(request("svc", "a")).await.unwrap();
        h.service.deregister(node.id).await.unwrap();
        assert!(h.service.list_nodes("svc").await.unwrap().is_empty());
        h.service.deregister(node.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_loop_persists_and_fans_out_to_siblings_only() {
        let h = harness();
        let a = h.service.register(request("svc", "a")).await.unwrap();
        let b = h.service.register(request("svc", "b")).await.unwrap();
        let c = h.service.register(request("svc", "c")).await.unwrap();
        let other = h.service.register(request("other", "d")).await.unwrap();

        let cancel = CancellationToken::new();
        let task = {
            let service = h.service.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { service.start(cancel).await })
        };

        h.updates.send(HealthUpdate::detached(a.with_state(NodeState::Down))).await.unwrap();
        wait_for(|| !h.gateway.sent.lock().is_empty()).await;

        assert_eq!(h.repo.nodes.lock()[&a.id].state, NodeState::Down);
        let (update, receivers) = h.gateway.sent.lock()[0].clone();
        assert_eq!(update.id, a.id);
        assert_eq!(update.state, NodeState::Down);
        let receivers: HashSet<_> = receivers.into_iter().collect();
        assert_eq!(receivers, HashSet::from([b.id, c.id]));
        assert!(!receivers.contains(&other.id));

        cancel.cancel();
        assert!(task.await.unwrap().unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_loop_survives_persistence_failure() {
        let h = harness();
        let a = h.service.register(request("svc", "a")).await.unwrap();
        let b = h.service.register(request("svc", "b")).await.unwrap();
        h.repo.failing.lock().insert(a.id);

        let cancel = CancellationToken::new();
        let task = {
            let service = h.service.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { service.start(cancel).await })
        };

        h.updates.send(HealthUpdate::detached(a.with_state(NodeState::Down))).await.unwrap();
        h.updates.send(HealthUpdate::detached(b.with_state(NodeState::Down))).await.unwrap();
        wait_for(|| !h.gateway.sent.lock().is_empty()).await;

        let sent = h.gateway.sent.lock().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0.id, b.id);
        assert_eq!(sent[0].1, vec![a.id]);
        assert_eq!(h.repo.nodes.lock()[&a.id].state, NodeState::Up);

        cancel.cancel();
        assert!(task.await.unwrap().unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_loop_acknowledges_each_update_after_writing_it() {
        let h = harness();
        let a = h.service.register(request("svc", "a")).await.unwrap();
        let b = h.service.register(request("svc", "b")).await.unwrap();
        h.repo.failing.lock().insert(b.id);

        let cancel = CancellationToken::new();
        let task = {
            let service = h.service.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { service.start(cancel).await })
        };

        let batch = SweepBatch::new();
        h.updates
            .send(batch.update(a.with_state(NodeState::Down)))
            .await
            .unwrap();
        h.updates
            .send(batch.update(b.with_state(NodeState::Down)))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(1), batch.settled())
            .await
            .unwrap();
        assert_eq!(h.repo.nodes.lock()[&a.id].state, NodeState::Down);
        assert_eq!(h.repo.nodes.lock()[&b.id].state, NodeState::Up);

        cancel.cancel();
        assert!(task.await.unwrap().unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_loop_reports_closed_stream_and_second_start() {
        let h = harness();
        let Harness {
            updates, service, ..
        } = h;
        drop(updates);

        let err = service.start(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, DomainError::StreamClosed));

        let err = service.start(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, DomainError::AlreadyStarted(_)));
    }
}
