use super::cache::DerivedViewStore;
use crate::core::{
    ConflictError, Entity, EntityId, EntityKind, MutationError, Value, ValidationError,
};
use crate::notify::{Confirmer, Notification};
use crate::source::EntityApi;
use log::{debug, warn};
use serde_json::Value as Json;

type MutationResult<T> = std::result::Result<T, MutationError>;

/// Result of a create that may fall back to a local-only record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The backend accepted the record (with the id it reported, if any).
    Created(Option<EntityId>),
    /// The backend was unreachable; the record is held locally.
    KeptLocal(EntityId),
}

impl DerivedViewStore {
    /// Validate and send a new record, then refetch the kind.
    pub async fn create<A>(
        &self,
        kind: EntityKind,
        payload: &Json,
        api: &A,
    ) -> MutationResult<Option<EntityId>>
    where
        A: EntityApi + ?Sized,
    {
        let result = self.send_create(kind, payload, api).await;
        self.report(kind, "created", &result);
        let id = result?;
        self.refetch(kind, api).await;
        Ok(id)
    }

    /// Like [`create`](Self::create), but a network failure keeps the
    /// payload as a local record (`id = "local-<uuid>"`, `status =
    /// "pending"`, `local = true`) until [`clear_local`](Self::clear_local).
    pub async fn create_or_keep_local<A>(
        &self,
        kind: EntityKind,
        payload: &Json,
        api: &A,
    ) -> MutationResult<CreateOutcome>
    where
        A: EntityApi + ?Sized,
    {
        match self.send_create(kind, payload, api).await {
            Ok(id) => {
                self.report(kind, "created", &Ok(()));
                self.refetch(kind, api).await;
                Ok(CreateOutcome::Created(id))
            }
            Err(MutationError::Rejected(err)) if err.is_network() => {
                let entity = local_record(payload);
                let id = entity.id().clone();
                warn!("{} create failed ({}), kept as {}", kind, err, id);
                self.insert_local(kind, entity).await;
                self.notifier().notify(Notification::warning(format!(
                    "Backend unreachable, {} saved locally as pending",
                    kind
                )));
                Ok(CreateOutcome::KeptLocal(id))
            }
            Err(err) => {
                self.report::<()>(kind, "created", &Err(err.clone()));
                Err(err)
            }
        }
    }

    pub async fn update<A>(
        &self,
        kind: EntityKind,
        id: &EntityId,
        payload: &Json,
        api: &A,
    ) -> MutationResult<()>
    where
        A: EntityApi + ?Sized,
    {
        let result = self.send_update(kind, id, payload, api).await;
        self.report(kind, "updated", &result);
        result?;
        self.refetch(kind, api).await;
        Ok(())
    }

    /// Ask the confirmer, then delete. A refusal is `Declined` and sends
    /// nothing.
    pub async fn delete<A, C>(
        &self,
        kind: EntityKind,
        id: &EntityId,
        api: &A,
        confirmer: &C,
    ) -> MutationResult<()>
    where
        A: EntityApi + ?Sized,
        C: Confirmer + ?Sized,
    {
        self.require_cached(kind, id).await.inspect_err(|err| {
            self.notifier().notify(Notification::error(err.to_string()));
        })?;

        let prompt = format!("Are you sure you want to delete this {} ({})?", kind, id);
        if !confirmer.confirm(&prompt).await {
            debug!("delete of {} {} declined", kind, id);
            return Err(MutationError::Declined);
        }

        let result = api.delete(kind, id).await;
        self.report(kind, "deleted", &result);
        result?;
        self.refetch(kind, api).await;
        Ok(())
    }

    /// Approve, reject, activate... one record.
    pub async fn update_status<A>(
        &self,
        kind: EntityKind,
        id: &EntityId,
        status: &str,
        api: &A,
    ) -> MutationResult<()>
    where
        A: EntityApi + ?Sized,
    {
        let result = self.send_status(kind, id, status, api).await;
        self.report(kind, "status updated", &result);
        result?;
        self.refetch(kind, api).await;
        Ok(())
    }

    /// Express interest in someone else's active post.
    ///
    /// Own posts and posts that are no longer active are conflicts and are
    /// never sent.
    pub async fn express_interest<A>(
        &self,
        post_id: &EntityId,
        viewer: &EntityId,
        message: &str,
        api: &A,
    ) -> MutationResult<()>
    where
        A: EntityApi + ?Sized,
    {
        let result = self.send_interest(post_id, viewer, message, api).await;
        match &result {
            Ok(()) => self
                .notifier()
                .notify(Notification::success("Interest expressed successfully!")),
            Err(err) => self.notifier().notify(Notification::error(err.to_string())),
        }
        result?;
        self.refetch(EntityKind::Posts, api).await;
        Ok(())
    }

    async fn send_create<A>(
        &self,
        kind: EntityKind,
        payload: &Json,
        api: &A,
    ) -> MutationResult<Option<EntityId>>
    where
        A: EntityApi + ?Sized,
    {
        kind.schema().validate_payload(payload)?;
        let response = api.create(kind, payload).await?;
        Ok(created_id(&response))
    }

    async fn send_update<A>(
        &self,
        kind: EntityKind,
        id: &EntityId,
        payload: &Json,
        api: &A,
    ) -> MutationResult<()>
    where
        A: EntityApi + ?Sized,
    {
        self.require_cached(kind, id).await?;
        kind.schema().validate_payload(payload)?;
        api.update(kind, id, payload).await?;
        Ok(())
    }

    async fn send_status<A>(
        &self,
        kind: EntityKind,
        id: &EntityId,
        status: &str,
        api: &A,
    ) -> MutationResult<()>
    where
        A: EntityApi + ?Sized,
    {
        self.require_cached(kind, id).await?;
        if status.trim().is_empty() {
            return Err(ValidationError::MissingField {
                kind,
                field: "status".to_string(),
            }
            .into());
        }
        api.update_status(kind, id, status).await
    }

    async fn send_interest<A>(
        &self,
        post_id: &EntityId,
        viewer: &EntityId,
        message: &str,
        api: &A,
    ) -> MutationResult<()>
    where
        A: EntityApi + ?Sized,
    {
        let kind = EntityKind::Posts;
        let post = self.require_cached(kind, post_id).await?;
        if post.is_owned_by(kind.schema(), viewer) {
            return Err(ConflictError::OwnPost(post_id.clone()).into());
        }
        let active = post.status().is_none_or(|status| status == "active");
        if !active || post.get("is_available") == Some(&Value::Boolean(false)) {
            return Err(ConflictError::NotActive(post_id.clone()).into());
        }
        api.express_interest(post_id, message).await
    }

    async fn require_cached(&self, kind: EntityKind, id: &EntityId) -> MutationResult<Entity> {
        self.entity(kind, id).await.ok_or_else(|| {
            ConflictError::NotFound {
                kind,
                id: id.clone(),
            }
            .into()
        })
    }

    async fn refetch<A>(&self, kind: EntityKind, api: &A)
    where
        A: EntityApi + ?Sized,
    {
        // Failures are already reported by refresh itself
        if let Err(err) = self.refresh(kind, api).await {
            debug!("refetch of {} after mutation failed: {}", kind, err);
        }
    }

    fn report<T>(&self, kind: EntityKind, verb: &str, result: &MutationResult<T>) {
        let notification = match result {
            Ok(_) => Notification::success(format!("{} {} successfully!", singular(kind), verb)),
            Err(MutationError::Declined) => return,
            Err(err) => Notification::error(err.to_string()),
        };
        self.notifier().notify(notification);
    }
}

fn singular(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Regions => "Region",
        EntityKind::Recommendations => "Recommendation",
        EntityKind::Warehouses => "Warehouse",
        EntityKind::StorageRequests => "Storage request",
        EntityKind::Posts => "Post",
        EntityKind::Saccos => "SACCO",
        EntityKind::Memberships => "Membership",
        EntityKind::LoanApplications => "Loan application",
    }
}

/// Id the backend reported for a created record, either at the top level
/// or inside a wrapper such as `{"message": ..., "warehouse": {...}}`.
fn created_id(response: &Json) -> Option<EntityId> {
    let object = response.as_object()?;
    object.get("id").and_then(EntityId::from_json).or_else(|| {
        object
            .values()
            .filter_map(Json::as_object)
            .find_map(|inner| inner.get("id").and_then(EntityId::from_json))
    })
}

fn local_record(payload: &Json) -> Entity {
    let mut entity = Entity::new(format!("local-{}", uuid::Uuid::new_v4()));
    if let Some(object) = payload.as_object() {
        for (field, value) in object {
            entity.set(field, Value::from_json(value));
        }
    }
    entity.with("status", "pending").with("local", true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_created_id_shapes() {
        assert_eq!(created_id(&json!({"id": 3})), Some(EntityId::from(3)));
        assert_eq!(
            created_id(&json!({"message": "Warehouse created successfully", "warehouse": {"id": 8}})),
            Some(EntityId::from(8))
        );
        assert_eq!(created_id(&json!({"message": "ok"})), None);
    }

    #[test]
    fn test_local_record_marks_pending() {
        let entity = local_record(&json!({"name": "Draft", "status": "active", "id": 4}));
        assert!(entity.id().as_str().starts_with("local-"));
        assert_eq!(entity.status(), Some("pending"));
        assert!(entity.is_local());
        assert_eq!(entity.text("name"), Some("Draft"));
    }
}
