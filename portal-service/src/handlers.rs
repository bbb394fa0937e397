use shared::*;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{info, warn};

use crate::store::{PortalStore, StoreEvent};

const COMMAND_BUFFER: usize = 64;

type Command = Box<dyn FnOnce(&mut PortalStore) + Send>;

/// Runs store commands one at a time, each to completion before the next.
pub struct CommandHandler {
    store: PortalStore,
}

impl CommandHandler {
    pub fn new(store: PortalStore) -> Self {
        Self { store }
    }

    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        while let Some(command) = commands.recv().await {
            command(&mut self.store);
        }
        info!("Store command channel closed, stopping");
    }
}

/// Cheap, cloneable access to the store actor.
#[derive(Clone)]
pub struct StoreHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<StoreEvent>,
}

impl StoreHandle {
    pub fn spawn(store: PortalStore) -> Self {
        let (commands, receiver) = mpsc::channel(COMMAND_BUFFER);
        let events = store.event_sender();
        tokio::spawn(CommandHandler::new(store).run(receiver));
        Self { commands, events }
    }

    /// Queues `f` against the store and waits for its result.
    pub async fn call<F, T>(&self, f: F) -> PortalResult<T>
    where
        F: FnOnce(&mut PortalStore) -> PortalResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply, result) = oneshot::channel();
        let command: Command = Box::new(move |store| {
            if reply.send(f(store)).is_err() {
                warn!("Store caller went away before the reply");
            }
        });
        self.commands
            .send(command)
            .await
            .map_err(|_| PortalError::StoreClosed)?;
        result.await.map_err(|_| PortalError::StoreClosed)?
    }

    /// Like [`call`](Self::call) for reads that cannot fail.
    pub async fn read<F, T>(&self, f: F) -> PortalResult<T>
    where
        F: FnOnce(&PortalStore) -> T + Send + 'static,
        T: Send + 'static,
    {
        self.call(move |store| Ok(f(store))).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, PersistencePolicy};
    use bigdecimal::BigDecimal;
    use std::sync::Arc;
    use uuid::Uuid;

    fn spawn_store() -> StoreHandle {
        let store = PortalStore::load(Arc::new(MemoryStorage::new()), PersistencePolicy::default())
            .unwrap();
        StoreHandle::spawn(store)
    }

    fn draft(sku: &str) -> ArticleDraft {
        ArticleDraft {
            sku: sku.to_string(),
            name: "Court Classic".to_string(),
            category: Gender::Unisex,
            price_per_pair: BigDecimal::from(250),
            mrp: None,
            images: Vec::new(),
            size_range: None,
            size_breakup: Vec::new(),
            availability: Availability::Available,
        }
    }

    #[tokio::test]
    async fn commands_run_in_order_through_the_handle() {
        let handle = spawn_store();
        let article = handle
            .call(|store| store.add_article(draft("KK-CC-1")))
            .await
            .unwrap();
        let id = article.id;

        let mut tasks = Vec::new();
        for _ in 0..20 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                handle.call(move |store| store.inward(id, 5)).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let stock = handle.call(move |store| store.inventory_of(id)).await.unwrap();
        assert_eq!(stock.actual_stock, 100);
        assert_eq!(stock.available_stock, 100);
    }

    #[tokio::test]
    async fn errors_come_back_to_the_caller() {
        let handle = spawn_store();
        let missing = Uuid::new_v4();
        let err = handle
            .call(move |store| store.inward(missing, 1))
            .await
            .unwrap_err();
        assert_eq!(err, PortalError::ArticleNotFound(missing));

        let articles = handle.read(|store| store.articles()).await.unwrap();
        assert!(articles.is_empty());
    }

    #[tokio::test]
    async fn subscribers_see_mutations() {
        let handle = spawn_store();
        let mut events = handle.subscribe();

        let article = handle
            .call(|store| store.add_article(draft("KK-CC-2")))
            .await
            .unwrap();

        assert_eq!(
            events.recv().await.unwrap(),
            StoreEvent::ArticleAdded {
                article_id: article.id
            }
        );
    }
}
