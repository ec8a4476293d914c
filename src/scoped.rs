use std::ops::{Deref, DerefMut};

use tracing::debug;

use crate::pool::DriverConnection;

/// A borrowed connection that goes back to the pool when this guard is dropped.
///
/// Drop runs on every exit path (return, `?`, panic unwinding, a cancelled future), so a
/// borrow is always paired with exactly one release.
pub struct ScopedConnection<C: DriverConnection> {
    conn: Option<C>,
}

impl<C: DriverConnection> ScopedConnection<C> {
    pub(crate) fn new(conn: C) -> Self {
        debug!("connection borrowed");
        Self { conn: Some(conn) }
    }

    /// Release through [`DriverConnection::abandon_transaction`] instead of a plain drop.
    pub(crate) fn abandon(&mut self) {
        if let Some(conn) = self.conn.take() {
            conn.abandon_transaction();
            debug!("connection released with an open transaction");
        }
    }
}

impl<C: DriverConnection> Deref for ScopedConnection<C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.conn.as_ref().expect("scoped connection already released")
    }
}

impl<C: DriverConnection> DerefMut for ScopedConnection<C> {
    fn deref_mut(&mut self) -> &mut C {
        self.conn.as_mut().expect("scoped connection already released")
    }
}

impl<C: DriverConnection> Drop for ScopedConnection<C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            drop(conn);
            debug!("connection released");
        }
    }
}
