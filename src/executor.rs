// Result shaping shared by the pool-level facade and the transaction facade. Each helper
// runs one prepared query on a connection the caller already holds.

use crate::error::AccessError;
use crate::pool::DriverConnection;
use crate::results::{EntryRow, ResultSet};
use crate::translation::PreparedQuery;
use crate::types::RowValues;

pub(crate) async fn result_set<C: DriverConnection>(
    conn: &mut C,
    prepared: &PreparedQuery,
) -> Result<ResultSet, AccessError> {
    conn.query(prepared.text(), prepared.args()).await
}

pub(crate) async fn entries<C: DriverConnection>(
    conn: &mut C,
    prepared: &PreparedQuery,
) -> Result<Vec<EntryRow>, AccessError> {
    Ok(result_set(conn, prepared).await?.into_entries())
}

pub(crate) async fn arrays<C: DriverConnection>(
    conn: &mut C,
    prepared: &PreparedQuery,
) -> Result<Vec<Vec<RowValues>>, AccessError> {
    Ok(result_set(conn, prepared).await?.into_arrays())
}

pub(crate) async fn execute<C: DriverConnection>(
    conn: &mut C,
    prepared: &PreparedQuery,
) -> Result<u64, AccessError> {
    conn.execute(prepared.text(), prepared.args()).await
}
