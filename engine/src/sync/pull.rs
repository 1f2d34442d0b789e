//! Pull session: fetch changes past each store's watermark and apply them.
//!
//! The countdown holds one unit per outstanding `get-changes`. Each
//! `sending-changes {n}` swaps its unit for `n`, and each applied change
//! releases one, so the session cannot finish before every requested store
//! has announced.

use super::{
    channel::Channel,
    protocol::Message,
    session::{drive, guarded, SessionHandler, SessionOptions},
};
use crate::{
    barrier::Countdown, change::WriteMode, error::Result, watermark, Database, Error, Mode,
    StoreName, META_STORE,
};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashSet;

/// Outcome of a pull session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullReport {
    /// Changes announced by the server across all stores
    pub announced: u64,
    /// `create` messages applied
    pub created: usize,
    /// `update` messages applied
    pub updated: usize,
}

struct PullHandler<'a> {
    db: &'a Database,
    requested: HashSet<StoreName>,
    pending_announcements: usize,
    applied: u64,
    report: PullReport,
}

impl PullHandler<'_> {
    fn expect_change(&self, store: &str) -> Result<()> {
        if !self.requested.contains(store) {
            return Err(Error::Protocol(format!(
                "change for store '{store}', which was not requested"
            )));
        }
        if self.applied >= self.report.announced {
            return Err(Error::Protocol(format!(
                "more changes than the {} announced",
                self.report.announced
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionHandler for PullHandler<'_> {
    async fn handle(&mut self, message: Message, countdown: &Countdown) -> Result<()> {
        match message {
            Message::SendingChanges {
                nr_of_records_to_sync: n,
            } => {
                if self.pending_announcements == 0 {
                    return Err(Error::Protocol(
                        "announcement without a pending get-changes".into(),
                    ));
                }
                let total = self
                    .report
                    .announced
                    .checked_add(n)
                    .filter(|total| i64::try_from(*total).is_ok())
                    .ok_or_else(|| {
                        Error::Protocol(format!("announced change count {n} is out of range"))
                    })?;
                self.pending_announcements -= 1;
                self.report.announced = total;
                tracing::debug!(changes = n, "pull announcement");
                // n <= total, which fits in i64
                countdown.add(n as i64 - 1);
            }

            Message::Create {
                store_name,
                mut record,
                timestamp,
                ..
            } => {
                self.expect_change(&store_name)?;
                let timestamp = timestamp
                    .ok_or_else(|| Error::Protocol("create without timestamp".into()))?;
                if record.key.is_none() {
                    return Err(Error::Protocol("create without record key".into()));
                }
                record.changed_since_sync = false;

                let name = store_name.clone();
                self.db
                    .transaction(
                        &[store_name.as_str(), META_STORE],
                        Mode::ReadWrite,
                        move |tx| {
                            tx.store(&name)?.write(record, WriteMode::Remote)?;
                            watermark::advance(tx, &name, timestamp)?;
                            Ok(())
                        },
                    )
                    .await?;

                self.applied += 1;
                self.report.created += 1;
                countdown.add(-1);
            }

            Message::Update {
                store_name,
                key,
                diff,
                timestamp,
                new_version,
            } => {
                self.expect_change(&store_name)?;

                let name = store_name.clone();
                self.db
                    .transaction(
                        &[store_name.as_str(), META_STORE],
                        Mode::ReadWrite,
                        move |tx| {
                            let mut store = tx.store(&name)?;
                            let mut record = store
                                .get(&key)?
                                .ok_or_else(|| Error::RecordNotFound(key.clone()))?;
                            record.apply_diff(&diff)?;
                            if let Some(version) = new_version {
                                record.version = Some(version);
                            }
                            record.changed_since_sync = false;
                            store.write(record, WriteMode::Remote)?;
                            watermark::advance(tx, &name, timestamp)?;
                            Ok(())
                        },
                    )
                    .await?;

                self.applied += 1;
                self.report.updated += 1;
                countdown.add(-1);
            }

            other => {
                return Err(Error::Protocol(format!(
                    "unexpected '{}' message during pull",
                    other.kind()
                )));
            }
        }
        Ok(())
    }
}

pub(crate) async fn run(
    db: &Database,
    channel: &mut dyn Channel,
    stores: &[StoreName],
    options: &SessionOptions,
) -> Result<PullReport> {
    guarded(options, async {
        let client_id = db.client_id().await?;

        let countdown = Countdown::default();
        let done = countdown.zero_signal();

        let since = db
            .read(&[META_STORE], |tx| {
                stores
                    .iter()
                    .map(|store| Ok((store.clone(), watermark::synced_to(tx, store)?)))
                    .collect::<Result<Vec<_>>>()
            })
            .await?;

        let mut handler = PullHandler {
            db,
            requested: stores.iter().cloned().collect(),
            pending_announcements: stores.len(),
            applied: 0,
            report: PullReport::default(),
        };

        countdown.add(stores.len() as i64);
        for (store, since) in since {
            tracing::debug!(store = %store, since, "requesting changes");
            channel
                .send(&Message::GetChanges {
                    store_name: store,
                    client_id: client_id.clone(),
                    since,
                })
                .await?;
        }

        drive(channel, &countdown, done, &mut handler).await?;
        Ok(handler.report)
    })
    .await
}
