//! Wire protocol between clients and the sync server.
//!
//! Every frame is one JSON object tagged by `type`:
//!
//! | type              | direction        | purpose                            |
//! |-------------------|------------------|------------------------------------|
//! | `create`          | both             | propagate a whole record           |
//! | `update`          | server to client | patch an existing record           |
//! | `get-changes`     | client to server | ask for changes past a watermark   |
//! | `sending-changes` | server to client | announce how many changes follow   |
//! | `ok`              | server to client | acknowledge a client `create`      |

use crate::{
    diff::Diff, error::Result, record::Record, ClientId, Cursor, Error, RecordKey, StoreName,
    Version,
};
use serde::{Deserialize, Serialize};

/// A protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Message {
    #[serde(rename_all = "camelCase")]
    Create {
        store_name: StoreName,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_id: Option<ClientId>,
        record: Record,
        /// Server cursor of this change; present on server-sent creates
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<Cursor>,
    },

    #[serde(rename_all = "camelCase")]
    Update {
        store_name: StoreName,
        key: RecordKey,
        diff: Diff,
        timestamp: Cursor,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_version: Option<Version>,
    },

    #[serde(rename_all = "camelCase")]
    GetChanges {
        /// Carries a single store name despite the plural field name
        #[serde(rename = "storeNames")]
        store_name: StoreName,
        client_id: ClientId,
        since: Cursor,
    },

    #[serde(rename_all = "camelCase")]
    SendingChanges { nr_of_records_to_sync: u64 },

    #[serde(rename_all = "camelCase")]
    Ok {
        store_name: StoreName,
        key: RecordKey,
        new_version: Version,
    },
}

impl Message {
    /// The `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Create { .. } => "create",
            Message::Update { .. } => "update",
            Message::GetChanges { .. } => "get-changes",
            Message::SendingChanges { .. } => "sending-changes",
            Message::Ok { .. } => "ok",
        }
    }

    /// Encode as a JSON text frame.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Protocol(e.to_string()))
    }

    /// Decode a JSON text frame.
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Protocol(e.to_string()))
    }

    /// Decode a binary frame holding UTF-8 JSON.
    pub fn decode_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::Protocol(e.to_string()))
    }
}
