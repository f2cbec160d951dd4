/**
    xenstore-rs provides a Rust based xenstore implementation.
    Copyright (C) 2016 Star Lab Corp.

    This program is free software; you can redistribute it and/or modify
    it under the terms of the GNU General Public License as published by
    the Free Software Foundation; either version 2 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU General Public License for more details.

    You should have received a copy of the GNU General Public License along
    with this program; if not, see <http://www.gnu.org/licenses/>.
**/

use error::{Error, Result};
use std::str;
use wire;

/// The Root Transaction Id.
pub const ROOT_TRANSACTION: wire::TxId = 0;

/// The `Transaction` type.
///
/// Handle for a server-side isolation context. Obtained from
/// `Client::transaction_start`, threaded as the `tx_id` of subsequent
/// requests, and consumed by `Client::transaction_end`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Transaction {
    id: wire::TxId,
}

impl Transaction {
    /// Parse the transaction id out of a `TRANSACTION_START` reply body.
    pub fn from_reply(body: &[u8]) -> Result<Transaction> {
        let fields = wire::split(body);
        let id = fields.first()
            .and_then(|f| str::from_utf8(f).ok())
            .and_then(|s| s.trim().parse::<wire::TxId>().ok())
            .ok_or_else(|| {
                Error::EINVAL(format!("bad transaction id in reply: {:?}", body))
            })?;

        if id == ROOT_TRANSACTION {
            return Err(Error::EINVAL(String::from("server returned the root transaction id")));
        }

        Ok(Transaction { id: id })
    }

    pub fn id(&self) -> wire::TxId {
        self.id
    }
}

/// The `TransactionStatus` type.
///
/// Used to specify whether a transaction is committed or abandoned.
#[derive(Debug)]
pub enum TransactionStatus {
    /// Commit the transaction
    Success,
    /// Abandon the transaction
    Failure,
}

impl TransactionStatus {
    /// The single-letter body of a `TRANSACTION_END` request.
    pub fn wire_str(&self) -> &'static str {
        match *self {
            TransactionStatus::Success => "T",
            TransactionStatus::Failure => "F",
        }
    }
}
