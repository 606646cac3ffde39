use std::{collections::BTreeMap, sync::Arc, time::SystemTime};

use futures::future::{BoxFuture, try_join_all};
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, from_value, json};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{
            CounterKey, InsertOutcome, IntentCompletion, PaymentIntentEntity, ReferrerEntity,
            SaleEntryEntity, Tally, TicketEntity, TicketStatus,
        },
        raffle_store::RaffleStore,
        storage::StorageResult,
    },
    state::{intent::IntentStatus, sale::EntryType},
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        AllDocsResponse, COUNTER_PREFIX, CouchCounterBody, CouchDocument, CouchReferralCodeBody, CouchTicketBody,
        END_SUFFIX, ENTRY_PREFIX, FindResponse, INTENT_PREFIX, REFERRER_PREFIX, TICKET_PREFIX,
        counter_doc_id, entry_doc_id, epoch_millis, intent_doc_id, referral_code_doc_id,
        referrer_doc_id, ticket_doc_id,
    },
};

/// Revision-checked writes give up after this many `409 Conflict` answers.
const MAX_WRITE_ATTEMPTS: u32 = 16;
const FIND_PAGE_SIZE: usize = 500;

/// Outcome of a revision-checked document write.
enum WriteStatus {
    Written,
    Conflict,
}

/// Raffle store backed by a CouchDB database.
#[derive(Clone)]
pub struct CouchRaffleStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchRaffleStore {
    /// Establish a connection to CouchDB and ensure the database and query indexes exist.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = Arc::<str>::from(config.base_url.trim_end_matches('/'));
        let database = Arc::<str>::from(config.database);
        let auth = config
            .username
            .zip(config.password)
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        let store = Self {
            client,
            base_url,
            database,
            auth,
        };

        store.ensure_database().await?;
        store.ensure_indexes().await?;
        Ok(store)
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, self.database, path);
        self.authorized(self.client.request(method, url))
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some((ref user, ref pass)) = self.auth {
            builder.basic_auth(user.as_ref(), Some(pass.as_ref()))
        } else {
            builder
        }
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = format!("{}/{}", self.base_url, self.database);

        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .authorized(self.client.put(&url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::DatabaseCreate {
                        database: database.clone(),
                        source,
                    })?;
                // 412 means another instance created it in the meantime.
                if create.status().is_success() || create.status() == StatusCode::PRECONDITION_FAILED
                {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn ensure_indexes(&self) -> CouchResult<()> {
        const INDEX: &str = "_index";
        let response = self
            .request(Method::POST, INDEX)
            .json(&json!({
                "index": { "fields": ["status", "created_at_ms"] },
                "name": "ticket-status-created",
                "type": "json",
            }))
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: INDEX.to_string(),
                source,
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(CouchDaoError::RequestStatus {
                path: INDEX.to_string(),
                status: response.status(),
            })
        }
    }

    async fn get_document<B>(&self, doc_id: &str) -> CouchResult<Option<CouchDocument<B>>>
    where
        B: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json::<CouchDocument<B>>()
                .await
                .map(Some)
                .map_err(|source| CouchDaoError::DecodeResponse {
                    path: doc_id.to_string(),
                    source,
                }),
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    /// PUT a document. Without a `_rev` this only succeeds when the id is unused.
    async fn put_document<B>(&self, document: &CouchDocument<B>) -> CouchResult<WriteStatus>
    where
        B: Serialize,
    {
        let response = self
            .request(Method::PUT, &document.id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: document.id.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::CONFLICT => Ok(WriteStatus::Conflict),
            status if status.is_success() => Ok(WriteStatus::Written),
            other => Err(CouchDaoError::RequestStatus {
                path: document.id.clone(),
                status: other,
            }),
        }
    }

    async fn delete_document(&self, doc_id: &str, rev: &str) -> CouchResult<WriteStatus> {
        let response = self
            .request(Method::DELETE, doc_id)
            .query(&[("rev", rev)])
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::CONFLICT | StatusCode::NOT_FOUND => Ok(WriteStatus::Conflict),
            status if status.is_success() => Ok(WriteStatus::Written),
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn create_document<B>(&self, doc_id: String, body: B) -> CouchResult<InsertOutcome>
    where
        B: Serialize,
    {
        match self.put_document(&CouchDocument::new(doc_id, None, body)).await? {
            WriteStatus::Written => Ok(InsertOutcome::Inserted),
            WriteStatus::Conflict => Ok(InsertOutcome::Occupied),
        }
    }

    /// Read-modify-write loop on `_rev`.
    ///
    /// `mutate` sees the current body (or `None` when the document is missing) and returns the
    /// body to write, or `None` to leave the document alone. Returns whether a write happened.
    async fn update_document<B, F>(&self, doc_id: &str, mut mutate: F) -> CouchResult<bool>
    where
        B: Serialize + DeserializeOwned,
        F: FnMut(Option<B>) -> Option<B>,
    {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let current = self.get_document::<B>(doc_id).await?;
            let (rev, body) = match current {
                Some(document) => (document.rev, Some(document.body)),
                None => (None, None),
            };
            let Some(next) = mutate(body) else {
                return Ok(false);
            };
            let document = CouchDocument::new(doc_id.to_string(), rev, next);
            match self.put_document(&document).await? {
                WriteStatus::Written => return Ok(true),
                WriteStatus::Conflict => {
                    debug!(doc_id, attempt, "CouchDB revision conflict; retrying");
                }
            }
        }
        Err(CouchDaoError::Conflict {
            path: doc_id.to_string(),
            attempts: MAX_WRITE_ATTEMPTS,
        })
    }

    async fn list_documents<B>(&self, prefix: &str) -> CouchResult<Vec<B>>
    where
        B: DeserializeOwned,
    {
        const ALL_DOCS: &str = "_all_docs";
        let query = [
            ("include_docs", "true".to_string()),
            ("startkey", format!("\"{}\"", prefix)),
            ("endkey", format!("\"{}{}\"", prefix, END_SUFFIX)),
        ];

        let response = self
            .request(Method::GET, ALL_DOCS)
            .query(&query)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: ALL_DOCS.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: ALL_DOCS.to_string(),
                status: response.status(),
            });
        }

        let payload = response.json::<AllDocsResponse>().await.map_err(|source| {
            CouchDaoError::DecodeResponse {
                path: ALL_DOCS.to_string(),
                source,
            }
        })?;

        payload
            .rows
            .into_iter()
            .filter_map(|row| row.doc)
            .map(|doc| decode_body(ALL_DOCS, doc))
            .collect()
    }

    /// Run a Mango query restricted to one document prefix, following bookmarks to the end.
    async fn find_documents<B>(&self, prefix: &str, mut selector: Value) -> CouchResult<Vec<CouchDocument<B>>>
    where
        B: DeserializeOwned,
    {
        const FIND: &str = "_find";
        if let Some(fields) = selector.as_object_mut() {
            fields.insert(
                "_id".into(),
                json!({ "$gt": prefix, "$lt": format!("{prefix}{END_SUFFIX}") }),
            );
        }

        let mut documents = Vec::new();
        let mut bookmark: Option<String> = None;
        loop {
            let mut query = json!({ "selector": &selector, "limit": FIND_PAGE_SIZE });
            if let (Some(mark), Some(fields)) = (bookmark.as_ref(), query.as_object_mut()) {
                fields.insert("bookmark".into(), Value::String(mark.clone()));
            }

            let response = self
                .request(Method::POST, FIND)
                .json(&query)
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: FIND.to_string(),
                    source,
                })?;
            if !response.status().is_success() {
                return Err(CouchDaoError::RequestStatus {
                    path: FIND.to_string(),
                    status: response.status(),
                });
            }
            let page = response.json::<FindResponse>().await.map_err(|source| {
                CouchDaoError::DecodeResponse {
                    path: FIND.to_string(),
                    source,
                }
            })?;

            let page_len = page.docs.len();
            for doc in page.docs {
                documents.push(decode_body::<CouchDocument<B>>(FIND, doc)?);
            }
            if page_len < FIND_PAGE_SIZE {
                break;
            }
            bookmark = page.bookmark;
        }
        Ok(documents)
    }

    async fn delete_reservation(&self, number: u32) -> CouchResult<bool> {
        let doc_id = ticket_doc_id(number);
        let Some(document) = self.get_document::<CouchTicketBody>(&doc_id).await? else {
            return Ok(false);
        };
        if document.body.status != TicketStatus::Reserved {
            return Ok(false);
        }
        let Some(rev) = document.rev else {
            return Ok(false);
        };
        // A conflict means the record changed (settled or already removed) since the read.
        Ok(matches!(
            self.delete_document(&doc_id, &rev).await?,
            WriteStatus::Written
        ))
    }

    async fn settle_ticket(&self, ticket: TicketEntity) -> CouchResult<bool> {
        let doc_id = ticket_doc_id(ticket.number);
        let settled: CouchTicketBody = ticket.into();
        let mut already_terminal = false;
        let written = self
            .update_document::<CouchTicketBody, _>(&doc_id, |current| match current {
                Some(existing) if existing.status.is_terminal() => {
                    already_terminal = true;
                    None
                }
                Some(existing) => Some(CouchTicketBody {
                    created_at_ms: existing.created_at_ms,
                    ..settled.clone()
                }),
                None => Some(settled.clone()),
            })
            .await?;
        Ok(written && !already_terminal)
    }

    async fn delete_expired_reservations(&self, cutoff: SystemTime) -> CouchResult<u64> {
        let expired = self
            .find_documents::<CouchTicketBody>(
                TICKET_PREFIX,
                json!({
                    "status": TicketStatus::Reserved.as_str(),
                    "created_at_ms": { "$lt": epoch_millis(cutoff) },
                }),
            )
            .await?;

        let mut removed = 0;
        for document in expired {
            let Some(rev) = document.rev.as_deref() else {
                continue;
            };
            if let WriteStatus::Written = self.delete_document(&document.id, rev).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn upsert_intent(&self, intent: PaymentIntentEntity) -> CouchResult<()> {
        let doc_id = intent_doc_id(&intent.id);
        self.update_document::<PaymentIntentEntity, _>(&doc_id, |_| Some(intent.clone()))
            .await?;
        Ok(())
    }

    async fn complete_intent(&self, id: String, completion: IntentCompletion) -> CouchResult<bool> {
        self.update_document::<PaymentIntentEntity, _>(&intent_doc_id(&id), |current| {
            let mut intent = current?;
            if intent.webhook_processed {
                return None;
            }
            intent.status = IntentStatus::Succeeded;
            intent.webhook_processed = true;
            intent.amount_received = Some(completion.amount_received);
            intent.referrer_id = completion.referrer_id;
            intent.succeeded_at = Some(completion.succeeded_at);
            Some(intent)
        })
        .await
    }

    async fn list_succeeded_intents(
        &self,
        entry_type: EntryType,
    ) -> CouchResult<Vec<PaymentIntentEntity>> {
        let documents = self
            .find_documents::<PaymentIntentEntity>(
                INTENT_PREFIX,
                json!({
                    "status": "succeeded",
                    "terms.entry_type": entry_type.as_str(),
                }),
            )
            .await?;
        Ok(documents.into_iter().map(|document| document.body).collect())
    }

    async fn replace_entry(&self, entry: SaleEntryEntity) -> CouchResult<bool> {
        let doc_id = entry_doc_id(&entry.id);
        self.update_document::<SaleEntryEntity, _>(&doc_id, |current| {
            current.map(|_| entry.clone())
        })
        .await
    }

    async fn delete_entry(&self, id: String) -> CouchResult<bool> {
        let doc_id = entry_doc_id(&id);
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let Some(document) = self.get_document::<SaleEntryEntity>(&doc_id).await? else {
                return Ok(false);
            };
            let Some(rev) = document.rev else {
                return Ok(false);
            };
            if let WriteStatus::Written = self.delete_document(&doc_id, &rev).await? {
                return Ok(true);
            }
        }
        Err(CouchDaoError::Conflict {
            path: doc_id,
            attempts: MAX_WRITE_ATTEMPTS,
        })
    }

    async fn insert_referrer(&self, referrer: ReferrerEntity) -> CouchResult<InsertOutcome> {
        // Claim the code first; the referrer document is only written by the claimant.
        let claim = self
            .create_document(
                referral_code_doc_id(&referrer.referral_code),
                CouchReferralCodeBody {
                    referrer_id: referrer.id,
                },
            )
            .await?;
        if claim == InsertOutcome::Occupied {
            return Ok(InsertOutcome::Occupied);
        }
        let code = referrer.referral_code.clone();
        let referrer_id = referrer.id;
        match self
            .create_document(referrer_doc_id(referrer_id), referrer)
            .await
        {
            Ok(InsertOutcome::Inserted) => Ok(InsertOutcome::Inserted),
            outcome => {
                // The claim must not outlive a referrer that was never written.
                if let Err(err) = self.release_code_claim(&code, referrer_id).await {
                    warn!(code = %code, error = %err, "failed to release referral code claim");
                }
                outcome
            }
        }
    }

    /// Delete the claim on `code` if it still belongs to `referrer_id`.
    async fn release_code_claim(&self, code: &str, referrer_id: Uuid) -> CouchResult<()> {
        let doc_id = referral_code_doc_id(code);
        let Some(claim) = self
            .get_document::<CouchReferralCodeBody>(&doc_id)
            .await?
        else {
            return Ok(());
        };
        if claim.body.referrer_id != referrer_id {
            return Ok(());
        }
        if let Some(rev) = claim.rev {
            self.delete_document(&doc_id, &rev).await?;
        }
        Ok(())
    }

    async fn find_referrer(&self, id: Uuid) -> CouchResult<Option<ReferrerEntity>> {
        Ok(self
            .get_document::<ReferrerEntity>(&referrer_doc_id(id))
            .await?
            .map(|document| document.body))
    }

    async fn find_referrer_by_code(&self, code: &str) -> CouchResult<Option<ReferrerEntity>> {
        match self
            .get_document::<CouchReferralCodeBody>(&referral_code_doc_id(code))
            .await?
        {
            Some(claim) => self.find_referrer(claim.body.referrer_id).await,
            None => Ok(None),
        }
    }

    async fn record_referrer_click(&self, code: String) -> CouchResult<bool> {
        let Some(claim) = self
            .get_document::<CouchReferralCodeBody>(&referral_code_doc_id(&code))
            .await?
        else {
            return Ok(false);
        };
        self.update_document::<ReferrerEntity, _>(
            &referrer_doc_id(claim.body.referrer_id),
            |current| {
                let mut referrer = current?;
                referrer.click_count += 1;
                Some(referrer)
            },
        )
        .await
    }

    async fn apply_delta(&self, key: CounterKey, delta: Tally) -> CouchResult<()> {
        match key {
            CounterKey::Global(entry_type) => {
                self.update_document::<CouchCounterBody, _>(&counter_doc_id(entry_type), |current| {
                    let mut counter = current.unwrap_or(CouchCounterBody {
                        entry_type,
                        tally: Tally::ZERO,
                    });
                    counter.tally += delta;
                    Some(counter)
                })
                .await?;
            }
            CounterKey::Referrer { id, entry_type } => {
                self.update_document::<ReferrerEntity, _>(&referrer_doc_id(id), |current| {
                    let mut referrer = current?;
                    *referrer.totals.entry(entry_type).or_default() += delta;
                    referrer.total_amount += delta.amount;
                    Some(referrer)
                })
                .await?;
            }
        }
        Ok(())
    }

    async fn global_totals(&self) -> CouchResult<BTreeMap<EntryType, Tally>> {
        let counters = self
            .list_documents::<CouchCounterBody>(COUNTER_PREFIX)
            .await?;
        Ok(counters
            .into_iter()
            .map(|counter| (counter.entry_type, counter.tally))
            .collect())
    }

    async fn set_global_totals(&self, entry_type: EntryType, tally: Tally) -> CouchResult<()> {
        self.update_document::<CouchCounterBody, _>(&counter_doc_id(entry_type), |_| {
            Some(CouchCounterBody { entry_type, tally })
        })
        .await?;
        Ok(())
    }

    async fn set_referrer_totals(
        &self,
        id: Uuid,
        totals: BTreeMap<EntryType, Tally>,
    ) -> CouchResult<bool> {
        self.update_document::<ReferrerEntity, _>(&referrer_doc_id(id), |current| {
            let mut referrer = current?;
            referrer.total_amount = totals.values().map(|tally| tally.amount).sum();
            referrer.totals = totals.clone();
            Some(referrer)
        })
        .await
    }

    async fn ping(&self) -> CouchResult<()> {
        let url = format!("{}/{}", self.base_url, self.database);
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: url.clone(),
                source,
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(CouchDaoError::RequestStatus {
                path: url,
                status: response.status(),
            })
        }
    }
}

fn decode_body<B: DeserializeOwned>(path: &str, doc: Value) -> CouchResult<B> {
    from_value(doc).map_err(|source| CouchDaoError::DeserializeValue {
        path: path.to_string(),
        source,
    })
}

impl RaffleStore for CouchRaffleStore {
    fn insert_ticket(&self, ticket: TicketEntity) -> BoxFuture<'static, StorageResult<InsertOutcome>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = ticket_doc_id(ticket.number);
            store
                .create_document(doc_id, CouchTicketBody::from(ticket))
                .await
                .map_err(Into::into)
        })
    }

    fn find_ticket(&self, number: u32) -> BoxFuture<'static, StorageResult<Option<TicketEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let document = store
                .get_document::<CouchTicketBody>(&ticket_doc_id(number))
                .await?;
            Ok(document.map(|document| document.body.into()))
        })
    }

    fn delete_reservation(&self, number: u32) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_reservation(number).await.map_err(Into::into) })
    }

    fn settle_ticket(&self, ticket: TicketEntity) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.settle_ticket(ticket).await.map_err(Into::into) })
    }

    fn delete_expired_reservations(
        &self,
        cutoff: SystemTime,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .delete_expired_reservations(cutoff)
                .await
                .map_err(Into::into)
        })
    }

    fn insert_intent(&self, intent: PaymentIntentEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.upsert_intent(intent).await.map_err(Into::into) })
    }

    fn find_intent(
        &self,
        id: String,
    ) -> BoxFuture<'static, StorageResult<Option<PaymentIntentEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let document = store
                .get_document::<PaymentIntentEntity>(&intent_doc_id(&id))
                .await?;
            Ok(document.map(|document| document.body))
        })
    }

    fn complete_intent(
        &self,
        id: String,
        completion: IntentCompletion,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .complete_intent(id, completion)
                .await
                .map_err(Into::into)
        })
    }

    fn list_succeeded_intents(
        &self,
        entry_type: EntryType,
    ) -> BoxFuture<'static, StorageResult<Vec<PaymentIntentEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .list_succeeded_intents(entry_type)
                .await
                .map_err(Into::into)
        })
    }

    fn insert_entry(&self, entry: SaleEntryEntity) -> BoxFuture<'static, StorageResult<InsertOutcome>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = entry_doc_id(&entry.id);
            store
                .create_document(doc_id, entry)
                .await
                .map_err(Into::into)
        })
    }

    fn find_entry(&self, id: String) -> BoxFuture<'static, StorageResult<Option<SaleEntryEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let document = store
                .get_document::<SaleEntryEntity>(&entry_doc_id(&id))
                .await?;
            Ok(document.map(|document| document.body))
        })
    }

    fn find_entries(
        &self,
        ids: Vec<String>,
    ) -> BoxFuture<'static, StorageResult<Vec<SaleEntryEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_ids: Vec<String> = ids.iter().map(|id| entry_doc_id(id)).collect();
            let documents = try_join_all(
                doc_ids
                    .iter()
                    .map(|doc_id| store.get_document::<SaleEntryEntity>(doc_id)),
            )
            .await?;
            Ok(documents
                .into_iter()
                .flatten()
                .map(|document| document.body)
                .collect())
        })
    }

    fn replace_entry(&self, entry: SaleEntryEntity) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.replace_entry(entry).await.map_err(Into::into) })
    }

    fn delete_entry(&self, id: String) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_entry(id).await.map_err(Into::into) })
    }

    fn list_entries(&self) -> BoxFuture<'static, StorageResult<Vec<SaleEntryEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .list_documents::<SaleEntryEntity>(ENTRY_PREFIX)
                .await
                .map_err(Into::into)
        })
    }

    fn insert_referrer(
        &self,
        referrer: ReferrerEntity,
    ) -> BoxFuture<'static, StorageResult<InsertOutcome>> {
        let store = self.clone();
        Box::pin(async move { store.insert_referrer(referrer).await.map_err(Into::into) })
    }

    fn find_referrer(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<ReferrerEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_referrer(id).await.map_err(Into::into) })
    }

    fn find_referrer_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<ReferrerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_referrer_by_code(&code)
                .await
                .map_err(Into::into)
        })
    }

    fn list_referrers(&self) -> BoxFuture<'static, StorageResult<Vec<ReferrerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .list_documents::<ReferrerEntity>(REFERRER_PREFIX)
                .await
                .map_err(Into::into)
        })
    }

    fn record_referrer_click(&self, code: String) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.record_referrer_click(code).await.map_err(Into::into) })
    }

    fn apply_delta(&self, key: CounterKey, delta: Tally) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.apply_delta(key, delta).await.map_err(Into::into) })
    }

    fn global_totals(&self) -> BoxFuture<'static, StorageResult<BTreeMap<EntryType, Tally>>> {
        let store = self.clone();
        Box::pin(async move { store.global_totals().await.map_err(Into::into) })
    }

    fn set_global_totals(
        &self,
        entry_type: EntryType,
        tally: Tally,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .set_global_totals(entry_type, tally)
                .await
                .map_err(Into::into)
        })
    }

    fn set_referrer_totals(
        &self,
        id: Uuid,
        totals: BTreeMap<EntryType, Tally>,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .set_referrer_totals(id, totals)
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Mutex};

    use axum::{
        Json, Router,
        body::Bytes,
        extract::{Path, State},
        http::{Method, StatusCode},
        routing::{any, get, post},
    };
    use serde_json::{Value, json};

    use super::*;
    use crate::state::sale::Money;

    /// Minimal CouchDB stand-in: documents are kept in memory and every write to a
    /// `referrer::` document fails with a server error.
    #[derive(Clone, Default)]
    struct FailingReferrerWrites {
        documents: Arc<Mutex<HashMap<String, Value>>>,
        deletes: Arc<Mutex<Vec<String>>>,
    }

    async fn document(
        State(couch): State<FailingReferrerWrites>,
        method: Method,
        Path(doc_id): Path<String>,
        body: Bytes,
    ) -> (StatusCode, Json<Value>) {
        let mut documents = couch.documents.lock().unwrap();
        match method {
            Method::GET => match documents.get(&doc_id) {
                Some(document) => (StatusCode::OK, Json(document.clone())),
                None => (StatusCode::NOT_FOUND, Json(json!({ "error": "not_found" }))),
            },
            Method::PUT if doc_id.starts_with(REFERRER_PREFIX) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "unknown_error" })),
            ),
            Method::PUT if documents.contains_key(&doc_id) => {
                (StatusCode::CONFLICT, Json(json!({ "error": "conflict" })))
            }
            Method::PUT => {
                let mut stored: Value = serde_json::from_slice(&body).unwrap_or_default();
                stored["_rev"] = json!("1-a");
                documents.insert(doc_id.clone(), stored);
                (StatusCode::CREATED, Json(json!({ "ok": true, "id": doc_id })))
            }
            Method::DELETE => {
                documents.remove(&doc_id);
                couch.deletes.lock().unwrap().push(doc_id);
                (StatusCode::OK, Json(json!({ "ok": true })))
            }
            _ => (StatusCode::METHOD_NOT_ALLOWED, Json(Value::Null)),
        }
    }

    async fn spawn_couch(couch: FailingReferrerWrites) -> String {
        let app = Router::new()
            .route("/raffle", get(|| async { Json(json!({ "db_name": "raffle" })) }))
            .route("/raffle/_index", post(|| async { Json(json!({ "result": "created" })) }))
            .route("/raffle/{doc_id}", any(document))
            .with_state(couch);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    fn referrer(code: &str) -> ReferrerEntity {
        ReferrerEntity {
            id: Uuid::new_v4(),
            name: "Jane Doe".to_owned(),
            referral_code: code.to_owned(),
            totals: Default::default(),
            total_amount: Money::ZERO,
            click_count: 0,
            created_at: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn failed_referrer_write_releases_the_code_claim() {
        let couch = FailingReferrerWrites::default();
        let base_url = spawn_couch(couch.clone()).await;
        let store = CouchRaffleStore::connect(CouchConfig {
            base_url,
            database: "raffle".to_owned(),
            username: None,
            password: None,
        })
        .await
        .unwrap();

        let err = store.insert_referrer(referrer("JaneD")).await.unwrap_err();
        assert!(matches!(err, CouchDaoError::RequestStatus { .. }));

        let claim_id = referral_code_doc_id("JaneD");
        assert_eq!(*couch.deletes.lock().unwrap(), vec![claim_id.clone()]);
        assert!(!couch.documents.lock().unwrap().contains_key(&claim_id));
        assert!(store.find_referrer_by_code("JaneD").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claims_held_by_another_referrer_are_left_alone() {
        let couch = FailingReferrerWrites::default();
        let base_url = spawn_couch(couch.clone()).await;
        let store = CouchRaffleStore::connect(CouchConfig {
            base_url,
            database: "raffle".to_owned(),
            username: None,
            password: None,
        })
        .await
        .unwrap();

        let owner = Uuid::new_v4();
        couch.documents.lock().unwrap().insert(
            referral_code_doc_id("JaneD"),
            json!({ "_id": referral_code_doc_id("JaneD"), "_rev": "1-a", "referrer_id": owner }),
        );

        store.release_code_claim("JaneD", Uuid::new_v4()).await.unwrap();
        assert!(couch.deletes.lock().unwrap().is_empty());
        assert!(couch.documents.lock().unwrap().contains_key(&referral_code_doc_id("JaneD")));
    }
}
