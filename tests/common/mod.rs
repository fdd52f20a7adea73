#![allow(dead_code)]

use agroview::{EntityKind, EntitySource, FetchError, FetchQuery};
use async_trait::async_trait;
use serde_json::{Value as Json, json};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::oneshot;

pub type Reply = Result<Json, FetchError>;

/// Each fetch waits on the next gate queued for its kind; ungated kinds
/// answer with an empty list at once.
#[derive(Default)]
pub struct GatedSource {
    gates: Mutex<HashMap<EntityKind, VecDeque<oneshot::Receiver<Reply>>>>,
}

impl GatedSource {
    pub fn gate(&self, kind: EntityKind) -> oneshot::Sender<Reply> {
        let (tx, rx) = oneshot::channel();
        self.gates
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .push_back(rx);
        tx
    }

    /// Gates queued for `kind` that no fetch has reached yet.
    pub fn queued(&self, kind: EntityKind) -> usize {
        self.gates
            .lock()
            .unwrap()
            .get(&kind)
            .map_or(0, VecDeque::len)
    }
}

#[async_trait]
impl EntitySource for GatedSource {
    async fn fetch(&self, kind: EntityKind, _query: &FetchQuery) -> Result<Json, FetchError> {
        let gate = {
            let mut gates = self.gates.lock().unwrap();
            gates.get_mut(&kind).and_then(VecDeque::pop_front)
        };
        match gate {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(FetchError::network("gate dropped"))),
            None => Ok(json!([])),
        }
    }
}

pub fn warehouse(id: i64, name: &str) -> Json {
    json!({"id": id, "name": name, "location": "Eldoret", "is_active": true})
}
