use std::{collections::BTreeMap, sync::Arc, time::SystemTime};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{DateTime, Document, doc},
    options::IndexOptions,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult, is_duplicate_key},
    models::{
        COUNTER_COLLECTION_NAME, ENTRY_COLLECTION_NAME, INTENT_COLLECTION_NAME,
        MongoCounterDocument, MongoEntryDocument, MongoIntentDocument, MongoReferrerDocument,
        MongoTicketDocument, REFERRER_COLLECTION_NAME, TICKET_COLLECTION_NAME, totals_document,
    },
};
use crate::{
    dao::{
        models::{
            CounterKey, InsertOutcome, IntentCompletion, PaymentIntentEntity, ReferrerEntity,
            SaleEntryEntity, Tally, TicketEntity, TicketStatus,
        },
        raffle_store::RaffleStore,
        storage::StorageResult,
    },
    state::sale::EntryType,
};

/// Raffle store backed by a MongoDB database.
#[derive(Clone)]
pub struct MongoRaffleStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoRaffleStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let tickets = self.collection::<Document>(TICKET_COLLECTION_NAME).await;
        let sweep_index = IndexModel::builder()
            .keys(doc! { "status": 1, "created_at": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some("ticket_status_created_idx".to_owned()))
                    .build(),
            )
            .build();
        tickets
            .create_index(sweep_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: TICKET_COLLECTION_NAME,
                index: "status,created_at",
                source,
            })?;

        let referrers = self.collection::<Document>(REFERRER_COLLECTION_NAME).await;
        let code_index = IndexModel::builder()
            .keys(doc! { "referral_code": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some("referral_code_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        referrers
            .create_index(code_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: REFERRER_COLLECTION_NAME,
                index: "referral_code",
                source,
            })?;

        let entries = self.collection::<Document>(ENTRY_COLLECTION_NAME).await;
        let referrer_index = IndexModel::builder()
            .keys(doc! { "referrer_id": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some("entry_referrer_idx".to_owned()))
                    .build(),
            )
            .build();
        entries
            .create_index(referrer_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: ENTRY_COLLECTION_NAME,
                index: "referrer_id",
                source,
            })?;

        Ok(())
    }

    async fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        let guard = self.inner.state.read().await;
        guard.database.collection::<T>(name)
    }

    async fn insert_ticket(&self, ticket: TicketEntity) -> MongoResult<InsertOutcome> {
        let number = ticket.number;
        let document: MongoTicketDocument = ticket.into();
        let collection = self
            .collection::<MongoTicketDocument>(TICKET_COLLECTION_NAME)
            .await;
        match collection.insert_one(&document).await {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(err) if is_duplicate_key(&err) => Ok(InsertOutcome::Occupied),
            Err(source) => Err(MongoDaoError::Ticket {
                number,
                operation: "insert",
                source,
            }),
        }
    }

    async fn find_ticket(&self, number: u32) -> MongoResult<Option<TicketEntity>> {
        let collection = self
            .collection::<MongoTicketDocument>(TICKET_COLLECTION_NAME)
            .await;
        collection
            .find_one(doc! { "_id": i64::from(number) })
            .await
            .map_err(|source| MongoDaoError::Ticket {
                number,
                operation: "load",
                source,
            })?
            .map(TryInto::try_into)
            .transpose()
    }

    async fn delete_reservation(&self, number: u32) -> MongoResult<bool> {
        let collection = self.collection::<Document>(TICKET_COLLECTION_NAME).await;
        let result = collection
            .delete_one(doc! { "_id": i64::from(number), "status": TicketStatus::Reserved.as_str() })
            .await
            .map_err(|source| MongoDaoError::Ticket {
                number,
                operation: "delete",
                source,
            })?;
        Ok(result.deleted_count > 0)
    }

    async fn settle_ticket(&self, ticket: TicketEntity) -> MongoResult<bool> {
        let number = ticket.number;
        let document: MongoTicketDocument = ticket.into();
        let collection = self.collection::<Document>(TICKET_COLLECTION_NAME).await;
        // Matching on `reserved` turns an already-terminal record into a duplicate-key upsert,
        // which is how a second settlement is detected without a read.
        let update = doc! {
            "$set": {
                "status": document.status.as_str(),
                "name": &document.name,
                "email": &document.email,
                "phone": document.phone.as_deref(),
                "amount_paid": document.amount_paid.cents(),
                "referral_code": document.referral_code.as_deref(),
                "referrer_id": document.referrer_id.as_deref(),
                "intent_id": document.intent_id.as_deref(),
            },
            "$setOnInsert": { "created_at": document.created_at },
        };
        match collection
            .update_one(doc! { "_id": document.number, "status": TicketStatus::Reserved.as_str() }, update)
            .upsert(true)
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if is_duplicate_key(&err) => Ok(false),
            Err(source) => Err(MongoDaoError::Ticket {
                number,
                operation: "settle",
                source,
            }),
        }
    }

    async fn delete_expired_reservations(&self, cutoff: SystemTime) -> MongoResult<u64> {
        let collection = self.collection::<Document>(TICKET_COLLECTION_NAME).await;
        let result = collection
            .delete_many(doc! {
                "status": TicketStatus::Reserved.as_str(),
                "created_at": { "$lt": DateTime::from_system_time(cutoff) },
            })
            .await
            .map_err(|source| MongoDaoError::Sweep { source })?;
        Ok(result.deleted_count)
    }

    async fn insert_intent(&self, intent: PaymentIntentEntity) -> MongoResult<()> {
        let id = intent.id.clone();
        let document: MongoIntentDocument = intent.into();
        let collection = self
            .collection::<MongoIntentDocument>(INTENT_COLLECTION_NAME)
            .await;
        collection
            .replace_one(doc! { "_id": &id }, &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::Intent {
                id,
                operation: "save",
                source,
            })?;
        Ok(())
    }

    async fn find_intent(&self, id: String) -> MongoResult<Option<PaymentIntentEntity>> {
        let collection = self
            .collection::<MongoIntentDocument>(INTENT_COLLECTION_NAME)
            .await;
        collection
            .find_one(doc! { "_id": &id })
            .await
            .map_err(|source| MongoDaoError::Intent {
                id: id.clone(),
                operation: "load",
                source,
            })?
            .map(TryInto::try_into)
            .transpose()
    }

    async fn complete_intent(&self, id: String, completion: IntentCompletion) -> MongoResult<bool> {
        let collection = self.collection::<Document>(INTENT_COLLECTION_NAME).await;
        let result = collection
            .update_one(
                doc! { "_id": &id, "webhook_processed": false },
                doc! {
                    "$set": {
                        "status": "succeeded",
                        "webhook_processed": true,
                        "amount_received": completion.amount_received.cents(),
                        "referrer_id": completion.referrer_id.map(|referrer| referrer.to_string()),
                        "succeeded_at": DateTime::from_system_time(completion.succeeded_at),
                    }
                },
            )
            .await
            .map_err(|source| MongoDaoError::Intent {
                id: id.clone(),
                operation: "complete",
                source,
            })?;
        Ok(result.modified_count > 0)
    }

    async fn list_succeeded_intents(
        &self,
        entry_type: EntryType,
    ) -> MongoResult<Vec<PaymentIntentEntity>> {
        let collection = self
            .collection::<MongoIntentDocument>(INTENT_COLLECTION_NAME)
            .await;
        let list_error = |source| MongoDaoError::Intent {
            id: "*".into(),
            operation: "list",
            source,
        };
        let documents: Vec<MongoIntentDocument> = collection
            .find(doc! { "status": "succeeded", "terms.entry_type": entry_type.as_str() })
            .await
            .map_err(list_error)?
            .try_collect()
            .await
            .map_err(list_error)?;
        documents.into_iter().map(TryInto::try_into).collect()
    }

    async fn insert_entry(&self, entry: SaleEntryEntity) -> MongoResult<InsertOutcome> {
        let id = entry.id.clone();
        let document: MongoEntryDocument = entry.into();
        let collection = self
            .collection::<MongoEntryDocument>(ENTRY_COLLECTION_NAME)
            .await;
        match collection.insert_one(&document).await {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(err) if is_duplicate_key(&err) => Ok(InsertOutcome::Occupied),
            Err(source) => Err(MongoDaoError::Entry {
                id,
                operation: "insert",
                source,
            }),
        }
    }

    async fn find_entry(&self, id: String) -> MongoResult<Option<SaleEntryEntity>> {
        let collection = self
            .collection::<MongoEntryDocument>(ENTRY_COLLECTION_NAME)
            .await;
        collection
            .find_one(doc! { "_id": &id })
            .await
            .map_err(|source| MongoDaoError::Entry {
                id: id.clone(),
                operation: "load",
                source,
            })?
            .map(TryInto::try_into)
            .transpose()
    }

    async fn find_entries_matching(&self, filter: Document) -> MongoResult<Vec<SaleEntryEntity>> {
        let collection = self
            .collection::<MongoEntryDocument>(ENTRY_COLLECTION_NAME)
            .await;
        let list_error = |source| MongoDaoError::Entry {
            id: "*".into(),
            operation: "list",
            source,
        };
        let documents: Vec<MongoEntryDocument> = collection
            .find(filter)
            .await
            .map_err(list_error)?
            .try_collect()
            .await
            .map_err(list_error)?;
        documents.into_iter().map(TryInto::try_into).collect()
    }

    async fn replace_entry(&self, entry: SaleEntryEntity) -> MongoResult<bool> {
        let id = entry.id.clone();
        let document: MongoEntryDocument = entry.into();
        let collection = self
            .collection::<MongoEntryDocument>(ENTRY_COLLECTION_NAME)
            .await;
        let result = collection
            .replace_one(doc! { "_id": &id }, &document)
            .await
            .map_err(|source| MongoDaoError::Entry {
                id: id.clone(),
                operation: "replace",
                source,
            })?;
        Ok(result.matched_count > 0)
    }

    async fn delete_entry(&self, id: String) -> MongoResult<bool> {
        let collection = self.collection::<Document>(ENTRY_COLLECTION_NAME).await;
        let result = collection
            .delete_one(doc! { "_id": &id })
            .await
            .map_err(|source| MongoDaoError::Entry {
                id: id.clone(),
                operation: "delete",
                source,
            })?;
        Ok(result.deleted_count > 0)
    }

    async fn insert_referrer(&self, referrer: ReferrerEntity) -> MongoResult<InsertOutcome> {
        let code = referrer.referral_code.clone();
        let document: MongoReferrerDocument = referrer.into();
        let collection = self
            .collection::<MongoReferrerDocument>(REFERRER_COLLECTION_NAME)
            .await;
        match collection.insert_one(&document).await {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(err) if is_duplicate_key(&err) => Ok(InsertOutcome::Occupied),
            Err(source) => Err(MongoDaoError::Referrer {
                key: code,
                operation: "insert",
                source,
            }),
        }
    }

    async fn find_referrer_matching(
        &self,
        key: String,
        filter: Document,
    ) -> MongoResult<Option<ReferrerEntity>> {
        let collection = self
            .collection::<MongoReferrerDocument>(REFERRER_COLLECTION_NAME)
            .await;
        collection
            .find_one(filter)
            .await
            .map_err(|source| MongoDaoError::Referrer {
                key,
                operation: "load",
                source,
            })?
            .map(TryInto::try_into)
            .transpose()
    }

    async fn list_referrers(&self) -> MongoResult<Vec<ReferrerEntity>> {
        let collection = self
            .collection::<MongoReferrerDocument>(REFERRER_COLLECTION_NAME)
            .await;
        let list_error = |source| MongoDaoError::Referrer {
            key: "*".into(),
            operation: "list",
            source,
        };
        let documents: Vec<MongoReferrerDocument> = collection
            .find(doc! {})
            .await
            .map_err(list_error)?
            .try_collect()
            .await
            .map_err(list_error)?;
        documents.into_iter().map(TryInto::try_into).collect()
    }

    async fn record_referrer_click(&self, code: String) -> MongoResult<bool> {
        let collection = self.collection::<Document>(REFERRER_COLLECTION_NAME).await;
        let result = collection
            .update_one(
                doc! { "referral_code": &code },
                doc! { "$inc": { "click_count": 1_i64 } },
            )
            .await
            .map_err(|source| MongoDaoError::Referrer {
                key: code.clone(),
                operation: "count click for",
                source,
            })?;
        Ok(result.matched_count > 0)
    }

    async fn apply_delta(&self, key: CounterKey, delta: Tally) -> MongoResult<()> {
        match key {
            CounterKey::Global(entry_type) => {
                let collection = self.collection::<Document>(COUNTER_COLLECTION_NAME).await;
                collection
                    .update_one(
                        doc! { "_id": entry_type.counter_id() },
                        doc! {
                            "$inc": {
                                "tickets": delta.tickets,
                                "amount_cents": delta.amount.cents(),
                            },
                            "$setOnInsert": { "entry_type": entry_type.as_str() },
                        },
                    )
                    .upsert(true)
                    .await
                    .map_err(|source| MongoDaoError::Counter {
                        key: entry_type.counter_id().to_owned(),
                        operation: "increment",
                        source,
                    })?;
            }
            CounterKey::Referrer { id, entry_type } => {
                let mut increments = Document::new();
                increments.insert(format!("totals.{entry_type}.tickets"), delta.tickets);
                increments.insert(
                    format!("totals.{entry_type}.amount_cents"),
                    delta.amount.cents(),
                );
                increments.insert("total_amount_cents", delta.amount.cents());
                let collection = self.collection::<Document>(REFERRER_COLLECTION_NAME).await;
                collection
                    .update_one(doc! { "_id": id.to_string() }, doc! { "$inc": increments })
                    .await
                    .map_err(|source| MongoDaoError::Counter {
                        key: format!("{id}/{entry_type}"),
                        operation: "increment",
                        source,
                    })?;
            }
        }
        Ok(())
    }

    async fn global_totals(&self) -> MongoResult<BTreeMap<EntryType, Tally>> {
        let collection = self
            .collection::<MongoCounterDocument>(COUNTER_COLLECTION_NAME)
            .await;
        let list_error = |source| MongoDaoError::Counter {
            key: "*".into(),
            operation: "list",
            source,
        };
        let documents: Vec<MongoCounterDocument> = collection
            .find(doc! {})
            .await
            .map_err(list_error)?
            .try_collect()
            .await
            .map_err(list_error)?;
        Ok(documents
            .into_iter()
            .map(|document| {
                (
                    document.entry_type,
                    Tally::new(document.tickets, document.amount_cents),
                )
            })
            .collect())
    }

    async fn set_global_totals(&self, entry_type: EntryType, tally: Tally) -> MongoResult<()> {
        let document = MongoCounterDocument {
            id: entry_type.counter_id().to_owned(),
            entry_type,
            tickets: tally.tickets,
            amount_cents: tally.amount,
        };
        let collection = self
            .collection::<MongoCounterDocument>(COUNTER_COLLECTION_NAME)
            .await;
        collection
            .replace_one(doc! { "_id": entry_type.counter_id() }, &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::Counter {
                key: entry_type.counter_id().to_owned(),
                operation: "overwrite",
                source,
            })?;
        Ok(())
    }

    async fn set_referrer_totals(
        &self,
        id: Uuid,
        totals: BTreeMap<EntryType, Tally>,
    ) -> MongoResult<bool> {
        let total_amount: i64 = totals.values().map(|tally| tally.amount.cents()).sum();
        let collection = self.collection::<Document>(REFERRER_COLLECTION_NAME).await;
        let result = collection
            .update_one(
                doc! { "_id": id.to_string() },
                doc! {
                    "$set": {
                        "totals": totals_document(&totals),
                        "total_amount_cents": total_amount,
                    }
                },
            )
            .await
            .map_err(|source| MongoDaoError::Counter {
                key: id.to_string(),
                operation: "overwrite",
                source,
            })?;
        Ok(result.matched_count > 0)
    }
}

impl RaffleStore for MongoRaffleStore {
    fn insert_ticket(&self, ticket: TicketEntity) -> BoxFuture<'static, StorageResult<InsertOutcome>> {
        let store = self.clone();
        Box::pin(async move { store.insert_ticket(ticket).await.map_err(Into::into) })
    }

    fn find_ticket(&self, number: u32) -> BoxFuture<'static, StorageResult<Option<TicketEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_ticket(number).await.map_err(Into::into) })
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
        Box::pin(async move { store.insert_intent(intent).await.map_err(Into::into) })
    }

    fn find_intent(
        &self,
        id: String,
    ) -> BoxFuture<'static, StorageResult<Option<PaymentIntentEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_intent(id).await.map_err(Into::into) })
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
        Box::pin(async move { store.insert_entry(entry).await.map_err(Into::into) })
    }

    fn find_entry(&self, id: String) -> BoxFuture<'static, StorageResult<Option<SaleEntryEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_entry(id).await.map_err(Into::into) })
    }

    fn find_entries(
        &self,
        ids: Vec<String>,
    ) -> BoxFuture<'static, StorageResult<Vec<SaleEntryEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_entries_matching(doc! { "_id": { "$in": ids } })
                .await
                .map_err(Into::into)
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
                .find_entries_matching(doc! {})
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
        Box::pin(async move {
            store
                .find_referrer_matching(id.to_string(), doc! { "_id": id.to_string() })
                .await
                .map_err(Into::into)
        })
    }

    fn find_referrer_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<ReferrerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let filter = doc! { "referral_code": &code };
            store
                .find_referrer_matching(code, filter)
                .await
                .map_err(Into::into)
        })
    }

    fn list_referrers(&self) -> BoxFuture<'static, StorageResult<Vec<ReferrerEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_referrers().await.map_err(Into::into) })
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
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
