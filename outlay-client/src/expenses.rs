//! Expense reads and mutations over the session cache.

use crate::error::ClientResult;
use outlay_core::{
    decode_payload, Expense, ExpenseDetail, ExpenseDraft, ExpenseEnvelope, ExpenseId, ExpenseList,
    Fetcher, ProvisionalIds, Value,
};
use outlay_sync::{CacheKey, CacheRead, Freshness, MutationCoordinator, ReadThroughCache};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

pub const EXPENSES_RESOURCE: &str = "/expenses";

/// Cache key of the expense list.
pub fn list_key() -> CacheKey {
    CacheKey::collection("expenses")
}

/// Cache key of one expense.
pub fn detail_key(id: ExpenseId) -> CacheKey {
    list_key().with(id)
}

pub fn detail_resource(id: ExpenseId) -> String {
    format!("{}/{}", EXPENSES_RESOURCE, id)
}

/// List, detail, create and delete for expenses.
///
/// Mutations target the list key; the list is the collection screens render.
#[derive(Clone)]
pub struct ExpenseService {
    reads: ReadThroughCache,
    coordinator: MutationCoordinator,
    fetcher: Arc<dyn Fetcher>,
    provisional: Arc<ProvisionalIds>,
}

impl ExpenseService {
    pub fn new(
        reads: ReadThroughCache,
        coordinator: MutationCoordinator,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            reads,
            coordinator,
            fetcher,
            provisional: Arc::new(ProvisionalIds::new()),
        }
    }

    pub async fn list(&self, freshness: Freshness) -> ClientResult<CacheRead<ExpenseList>> {
        let read = self
            .reads
            .read(&list_key(), EXPENSES_RESOURCE, freshness, self.fetcher.as_ref())
            .await?;
        Ok(read.try_map(decode_payload)?)
    }

    /// One expense; `None` when the server does not know the id.
    pub async fn get(
        &self,
        id: ExpenseId,
        freshness: Freshness,
    ) -> ClientResult<CacheRead<Option<Expense>>> {
        let read = self
            .reads
            .read(&detail_key(id), &detail_resource(id), freshness, self.fetcher.as_ref())
            .await?;
        let detail = read.try_map(decode_payload::<ExpenseDetail>)?;
        Ok(detail.map(|d| d.expense))
    }

    /// Validate `draft`, show it in the list under a provisional id, then
    /// create it on the server. Returns the server's expense.
    pub async fn create(&self, draft: &ExpenseDraft) -> ClientResult<Expense> {
        let new = draft.validate()?;
        let provisional = Expense::provisional(self.provisional.allocate(), &new);
        let body = json!({ "title": new.title(), "amount": new.amount() });
        let fetcher = Arc::clone(&self.fetcher);

        let confirmed = self
            .coordinator
            .run(&list_key(), append_expense(provisional), move || async move {
                let value = fetcher.post(EXPENSES_RESOURCE, &body).await?;
                decode_payload::<ExpenseEnvelope>(value)
            })
            .await?;

        let expense = confirmed.into_response().expense;
        info!(expense_id = expense.id, "Expense created");
        Ok(expense)
    }

    /// Remove `id` from the list immediately, then delete it on the server.
    pub async fn delete(&self, id: ExpenseId) -> ClientResult<()> {
        let resource = detail_resource(id);
        let fetcher = Arc::clone(&self.fetcher);

        let result = self
            .coordinator
            .run(&list_key(), remove_expense(id), move || async move {
                fetcher.delete(&resource, &Value::Null).await
            })
            .await;
        self.coordinator.cache().invalidate(&detail_key(id));

        result?;
        info!(expense_id = id, "Expense deleted");
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Patches
// ----------------------------------------------------------------------------

/// Append `expense` to a cached list. No-op when the list is not cached.
pub(crate) fn append_expense(expense: Expense) -> impl FnOnce(Option<Value>) -> Option<Value> {
    move |current| {
        current.map(|mut value| {
            let row = serde_json::to_value(&expense);
            if let (Some(rows), Ok(row)) = (expense_rows(&mut value), row) {
                rows.push(row);
            }
            value
        })
    }
}

pub(crate) fn remove_expense(id: ExpenseId) -> impl FnOnce(Option<Value>) -> Option<Value> {
    move |current| {
        current.map(|mut value| {
            if let Some(rows) = expense_rows(&mut value) {
                rows.retain(|row| row.get("id").and_then(Value::as_i64) != Some(id));
            }
            value
        })
    }
}

/// Point a cached detail entry at an uploaded receipt.
///
/// Writes `fileUrl` when the server sent that name and no `fileReference`,
/// so the entry keeps the server's shape.
pub(crate) fn set_file_reference(
    object_key: String,
) -> impl FnOnce(Option<Value>) -> Option<Value> {
    move |current| {
        current.map(|mut value| {
            if let Some(expense) = value.get_mut("expense").and_then(Value::as_object_mut) {
                let field = if expense.contains_key("fileUrl")
                    && !expense.contains_key("fileReference")
                {
                    "fileUrl"
                } else {
                    "fileReference"
                };
                expense.insert(field.to_string(), Value::String(object_key));
            }
            value
        })
    }
}

/// The `expenses` array of a cached list body. Other shapes yield `None`
/// and the patches leave them untouched.
fn expense_rows(value: &mut Value) -> Option<&mut Vec<Value>> {
    value.get_mut("expenses").and_then(Value::as_array_mut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use outlay_core::RequestFailed;
    use outlay_sync::{CacheEvent, EntityCache};
    use outlay_test_utils::{
        expense, expense_envelope_value, expense_list_of, server_expense_list_of, Method,
        MockFetcher,
    };

    fn service(fetcher: Arc<MockFetcher>) -> (Arc<EntityCache>, ExpenseService) {
        let cache = Arc::new(EntityCache::new());
        let service = ExpenseService::new(
            ReadThroughCache::with_defaults(Arc::clone(&cache)),
            MutationCoordinator::new(Arc::clone(&cache)),
            fetcher,
        );
        (cache, service)
    }

    fn cached_ids(cache: &EntityCache) -> Vec<ExpenseId> {
        cache
            .get(&list_key())
            .and_then(|v| serde_json::from_value::<ExpenseList>(v).ok())
            .map(|l| l.ids())
            .unwrap_or_default()
    }

    #[test]
    fn test_keys() {
        assert_eq!(list_key().to_string(), "expenses");
        assert_eq!(detail_key(7).to_string(), "expenses/7");
        assert!(list_key().is_prefix_of(&detail_key(7)));
        assert_eq!(detail_resource(7), "/expenses/7");
    }

    #[test]
    fn test_patches_ignore_foreign_shapes() {
        let odd = json!({"unexpected": true});
        assert_eq!(remove_expense(1)(Some(odd.clone())), Some(odd.clone()));
        assert_eq!(append_expense(expense(1, "a", 1.0))(None), None);
        let empty = json!({"expense": null});
        assert_eq!(set_file_reference("k".into())(Some(empty.clone())), Some(empty));
    }

    #[test]
    fn test_patches_keep_server_fields() {
        let removed = remove_expense(7)(Some(server_expense_list_of(&[5, 7, 9])));
        assert_eq!(removed, Some(server_expense_list_of(&[5, 9])));

        let mut listed = server_expense_list_of(&[5]);
        listed["page"] = json!(1);
        let appended = append_expense(expense(-1, "Coffee", 4.0))(Some(listed.clone())).unwrap();
        assert_eq!(appended["expenses"][0], listed["expenses"][0]);
        assert_eq!(appended["expenses"][1]["id"], json!(-1));
        assert_eq!(appended["page"], json!(1));

        let detail = json!({
            "expense": {"id": 7, "title": "t", "amount": 1.0, "fileUrl": null, "userId": "u1"}
        });
        let patched = set_file_reference("receipts/a.png".into())(Some(detail)).unwrap();
        assert_eq!(
            patched,
            json!({
                "expense": {
                    "id": 7,
                    "title": "t",
                    "amount": 1.0,
                    "fileUrl": "receipts/a.png",
                    "userId": "u1"
                }
            })
        );
        let decoded: ExpenseDetail = serde_json::from_value(patched).unwrap();
        assert_eq!(
            decoded.expense.unwrap().file_reference.as_deref(),
            Some("receipts/a.png")
        );

        let modern = json!({"expense": {"id": 7, "title": "t", "amount": 1.0}});
        let patched = set_file_reference("k".into())(Some(modern)).unwrap();
        assert_eq!(patched["expense"]["fileReference"], json!("k"));
    }

    #[tokio::test]
    async fn test_delete_then_identical_refetch_is_unchanged() {
        let fetcher = Arc::new(
            MockFetcher::new()
                .with_get("/expenses", server_expense_list_of(&[5, 7, 9]))
                .with_get("/expenses", server_expense_list_of(&[5, 9]))
                .with_delete("/expenses/7", Value::Null),
        );
        let (cache, service) = service(Arc::clone(&fetcher));
        service.list(Freshness::consistent()).await.unwrap();

        service.delete(7).await.unwrap();
        assert_eq!(cache.get(&list_key()), Some(server_expense_list_of(&[5, 9])));

        let mut events = cache.subscribe();
        let list = service.list(Freshness::consistent()).await.unwrap();
        assert_eq!(list.value().ids(), vec![5, 9]);
        assert!(matches!(
            events.recv().await.unwrap(),
            CacheEvent::Updated { changed: false, .. }
        ));
    }

    #[tokio::test]
    async fn test_list_decodes() {
        let fetcher = Arc::new(MockFetcher::new().with_get("/expenses", expense_list_of(&[1, 2])));
        let (_, service) = service(fetcher);
        let list = service.list(Freshness::consistent()).await.unwrap();
        assert_eq!(list.value().ids(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_get_unknown_is_none() {
        let fetcher =
            Arc::new(MockFetcher::new().with_get("/expenses/9", json!({"expense": null})));
        let (_, service) = service(fetcher);
        assert!(service.get(9, Freshness::consistent()).await.unwrap().into_value().is_none());
    }

    #[tokio::test]
    async fn test_create_validates_before_network() {
        let fetcher = Arc::new(MockFetcher::new());
        let (_, service) = service(Arc::clone(&fetcher));
        let err = service.create(&ExpenseDraft::new("   ", 4.0)).await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
        let err = service.create(&ExpenseDraft::new("Coffee", 0.0)).await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_create_sends_trimmed_title() {
        let created = expense_envelope_value(&expense(42, "Coffee", 4.0));
        let fetcher = Arc::new(MockFetcher::new().with_post("/expenses", created));
        let (cache, service) = service(Arc::clone(&fetcher));
        cache.set(&list_key(), expense_list_of(&[1]));

        let created = service.create(&ExpenseDraft::new(" Coffee ", 4.0)).await.unwrap();
        assert_eq!(created.id, 42);
        let calls = fetcher.calls_to(Method::Post, "/expenses");
        assert_eq!(calls[0].body, json!({"title": "Coffee", "amount": 4.0}));

        // The provisional row stays until the refetch replaces it.
        let ids = cached_ids(&cache);
        assert_eq!(ids.len(), 2);
        assert!(ids[1] < 0);
        assert!(cache.entry(&list_key()).unwrap().is_stale());
    }

    #[tokio::test]
    async fn test_create_malformed_response_rolls_back() {
        let fetcher = Arc::new(MockFetcher::new().with_post("/expenses", json!({"ok": true})));
        let (cache, service) = service(fetcher);
        cache.set(&list_key(), expense_list_of(&[1]));

        let err = service.create(&ExpenseDraft::new("Coffee", 4.0)).await.unwrap_err();
        assert!(matches!(err, ClientError::Mutation(_)));
        assert_eq!(cached_ids(&cache), vec![1]);
    }

    #[tokio::test]
    async fn test_delete_failure_restores_and_invalidates_detail() {
        let fetcher = Arc::new(
            MockFetcher::new()
                .with_delete_error("/expenses/7", RequestFailed::status(500, "db down")),
        );
        let (cache, service) = service(fetcher);
        cache.set(&list_key(), expense_list_of(&[5, 7, 9]));
        cache.set(&detail_key(7), json!({"expense": expense(7, "Expense 7", 10.0)}));

        let err = service.delete(7).await.unwrap_err();
        match err {
            ClientError::Mutation(failed) => assert_eq!(failed.source.status_code(), Some(500)),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(cached_ids(&cache), vec![5, 7, 9]);
        assert!(cache.entry(&detail_key(7)).unwrap().is_stale());
    }

    #[tokio::test]
    async fn test_delete_success_keeps_patch() {
        let fetcher = Arc::new(MockFetcher::new().with_delete("/expenses/7", Value::Null));
        let (cache, service) = service(Arc::clone(&fetcher));
        cache.set(&list_key(), expense_list_of(&[5, 7, 9]));

        service.delete(7).await.unwrap();
        assert_eq!(cached_ids(&cache), vec![5, 9]);
        assert_eq!(fetcher.calls_to(Method::Delete, "/expenses/7").len(), 1);
    }
}
