//! Address pool row operations

use crate::allocator::{self, AddressStore};
use crate::db::{now_epoch_secs, Database};
use crate::error::{is_foreign_key_violation, is_unique_violation};
use crate::ipv4;
use crate::types::{AddressFilter, AddressRow, AllocationRequest, NewAddress};
use crate::{Error, Result};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::net::Ipv4Addr;
use tracing::{debug, info};

const ADDRESS_COLUMNS: &str =
    "id, address, group_name, gateway, available_for_user, created_at, updated_at";

fn ip_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Ipv4Addr> {
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn address_from_row(row: &Row<'_>) -> rusqlite::Result<AddressRow> {
    let gateway = match row.get::<_, Option<String>>(3)? {
        Some(_) => Some(ip_column(row, 3)?),
        None => None,
    };
    Ok(AddressRow {
        id: row.get(0)?,
        address: ip_column(row, 1)?,
        group: row.get(2)?,
        gateway,
        available_for_user: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Translate write failures into domain errors
fn write_error(err: rusqlite::Error, new: &NewAddress) -> Error {
    if is_unique_violation(&err) {
        Error::AddressConflict {
            address: new.address,
        }
    } else if is_foreign_key_violation(&err) {
        Error::validation(format!("unknown group {:?}", new.group))
    } else {
        err.into()
    }
}

fn fetch_address(conn: &Connection, id: i64) -> Result<Option<AddressRow>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM ip_addresses WHERE id = ?1", ADDRESS_COLUMNS),
            params![id],
            address_from_row,
        )
        .optional()?;
    Ok(row)
}

fn check_group_name(group: &str) -> Result<()> {
    if group.trim().is_empty() {
        return Err(Error::validation("group is required"));
    }
    Ok(())
}

impl AddressStore for Connection {
    fn address_exists(&self, address: Ipv4Addr) -> Result<bool> {
        let count: i64 = self.query_row(
            "SELECT COUNT(*) FROM ip_addresses WHERE address = ?1",
            params![address.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn insert_address(&self, new: &NewAddress) -> Result<AddressRow> {
        let now = now_epoch_secs();
        self.execute(
            "INSERT INTO ip_addresses
                (address, address_value, group_name, gateway, available_for_user, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                new.address.to_string(),
                ipv4::sort_key(new.address),
                new.group,
                new.gateway.map(|g| g.to_string()),
                new.available_for_user,
                now,
                now,
            ],
        )
        .map_err(|e| write_error(e, new))?;

        Ok(AddressRow {
            id: self.last_insert_rowid(),
            address: new.address,
            group: new.group.clone(),
            gateway: new.gateway,
            available_for_user: new.available_for_user,
            created_at: now,
            updated_at: now,
        })
    }
}

impl Database {
    /// List pool rows in numeric address order
    pub fn list_addresses(&self, filter: &AddressFilter) -> Result<Vec<AddressRow>> {
        let mut sql = format!("SELECT {} FROM ip_addresses WHERE 1 = 1", ADDRESS_COLUMNS);
        let mut args: Vec<Value> = Vec::new();

        if let Some(group) = &filter.group {
            sql.push_str(" AND group_name = ?");
            args.push(Value::Text(group.clone()));
        }
        if let Some(available) = filter.available_for_user {
            sql.push_str(" AND available_for_user = ?");
            args.push(Value::Integer(available as i64));
        }
        sql.push_str(" ORDER BY address_value");

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args), address_from_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    pub fn get_address(&self, id: i64) -> Result<Option<AddressRow>> {
        let conn = self.conn.lock();
        fetch_address(&conn, id)
    }

    pub fn address_exists(&self, address: Ipv4Addr) -> Result<bool> {
        let conn = self.conn.lock();
        conn.address_exists(address)
    }

    /// Insert a single row
    pub fn create_address(&self, new: &NewAddress) -> Result<AddressRow> {
        check_group_name(&new.group)?;
        let conn = self.conn.lock();
        let row = conn.insert_address(new)?;
        info!("Created address {} in group {}", row.address, row.group);
        Ok(row)
    }

    /// Replace every writable field of an existing row
    pub fn update_address(&self, id: i64, new: &NewAddress) -> Result<AddressRow> {
        check_group_name(&new.group)?;
        let now = now_epoch_secs();

        let conn = self.conn.lock();
        let changed = conn
            .execute(
                "UPDATE ip_addresses
                 SET address = ?1, address_value = ?2, group_name = ?3, gateway = ?4,
                     available_for_user = ?5, updated_at = ?6
                 WHERE id = ?7",
                params![
                    new.address.to_string(),
                    ipv4::sort_key(new.address),
                    new.group,
                    new.gateway.map(|g| g.to_string()),
                    new.available_for_user,
                    now,
                    id,
                ],
            )
            .map_err(|e| write_error(e, new))?;

        if changed == 0 {
            return Err(Error::not_found("address", id));
        }
        debug!("Updated address {} ({})", id, new.address);

        fetch_address(&conn, id)?.ok_or_else(|| Error::not_found("address", id))
    }

    pub fn delete_address(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn.execute("DELETE FROM ip_addresses WHERE id = ?1", params![id])?;
        if rows > 0 {
            debug!("Deleted address {}", id);
        }
        Ok(rows > 0)
    }

    /// Bulk-create rows for every entry of `request` inside one transaction.
    ///
    /// The request is validated before the store is touched. On any failure
    /// the transaction is dropped uncommitted, so no row from this call
    /// survives.
    pub fn allocate(&self, request: &AllocationRequest) -> Result<Vec<AddressRow>> {
        let plan = allocator::validate(request)?;
        let mode = plan.mode();

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let rows = allocator::execute(&*tx, plan)?;
        tx.commit()?;

        info!("Allocated {} address(es) in {} mode", rows.len(), mode);
        Ok(rows)
    }
}
