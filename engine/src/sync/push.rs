//! Push session: send dirty records, wait for every acknowledgement.

use super::{
    channel::Channel,
    protocol::Message,
    session::{drive, guarded, SessionHandler, SessionOptions},
};
use crate::{
    barrier::Countdown, change::WriteMode, error::Result, record::Record, Database, Error, Mode,
    RecordKey, StoreName, CHANGED_SINCE_SYNC_INDEX,
};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Outcome of a push session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushReport {
    /// Records sent as `create`
    pub sent: usize,
    /// Acknowledgements applied
    pub acknowledged: usize,
}

struct PushHandler<'a> {
    db: &'a Database,
    in_flight: HashMap<(StoreName, RecordKey), Record>,
    acknowledged: usize,
}

#[async_trait]
impl SessionHandler for PushHandler<'_> {
    async fn handle(&mut self, message: Message, countdown: &Countdown) -> Result<()> {
        let (store_name, key, new_version) = match message {
            Message::Ok {
                store_name,
                key,
                new_version,
            } => (store_name, key, new_version),
            other => {
                return Err(Error::Protocol(format!(
                    "unexpected '{}' message during push",
                    other.kind()
                )));
            }
        };

        let sent = self
            .in_flight
            .remove(&(store_name.clone(), key.clone()))
            .ok_or_else(|| {
                Error::Protocol(format!(
                    "acknowledgement for {store_name}/{key}, which is not in flight"
                ))
            })?;

        let name = store_name.clone();
        self.db
            .transaction(&[store_name.as_str()], Mode::ReadWrite, move |tx| {
                let mut store = tx.store(&name)?;
                let mut record = store
                    .get(&key)?
                    .ok_or_else(|| Error::RecordNotFound(key.clone()))?;

                record.version = Some(new_version);
                if record.fields == sent.fields {
                    record.changed_since_sync = false;
                } else {
                    tracing::debug!(
                        store = %name,
                        key = %key,
                        "record changed while in flight, keeping it dirty"
                    );
                }
                store.write(record, WriteMode::Remote)
            })
            .await?;

        self.acknowledged += 1;
        countdown.add(-1);
        Ok(())
    }
}

pub(crate) async fn run(
    db: &Database,
    channel: &mut dyn Channel,
    stores: &[StoreName],
    options: &SessionOptions,
) -> Result<PushReport> {
    guarded(options, async {
        let client_id = db.client_id().await?;

        let countdown = Countdown::default();
        let done = countdown.zero_signal();

        let scope: Vec<&str> = stores.iter().map(String::as_str).collect();
        let dirty = db
            .read(&scope, |tx| {
                let mut dirty = Vec::new();
                for store in stores {
                    let records = tx
                        .store(store)?
                        .index(CHANGED_SINCE_SYNC_INDEX)?
                        .get(&[Value::Bool(true)]);
                    dirty.extend(records.into_iter().map(|r| (store.clone(), r)));
                }
                Ok(dirty)
            })
            .await?;

        let mut handler = PushHandler {
            db,
            in_flight: HashMap::new(),
            acknowledged: 0,
        };
        let mut outgoing = Vec::with_capacity(dirty.len());
        for (store, record) in dirty {
            let key = record.key.clone().ok_or(Error::MissingKey)?;
            if handler
                .in_flight
                .insert((store.clone(), key), record.clone())
                .is_none()
            {
                outgoing.push(Message::Create {
                    store_name: store,
                    client_id: Some(client_id.clone()),
                    record,
                    timestamp: None,
                });
            }
        }

        let sent = outgoing.len();
        tracing::debug!(stores = ?stores, records = sent, "push collected dirty records");
        countdown.add(sent as i64);

        for message in &outgoing {
            channel.send(message).await?;
        }

        drive(channel, &countdown, done, &mut handler).await?;

        Ok(PushReport {
            sent,
            acknowledged: handler.acknowledged,
        })
    })
    .await
}
