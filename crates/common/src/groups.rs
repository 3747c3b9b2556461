//! Group directory operations

use crate::db::{now_epoch_secs, Database};
use crate::error::is_unique_violation;
use crate::types::{Group, GroupSummary};
use crate::{Error, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

const MAX_GROUP_NAME_LEN: usize = 64;

/// Validate and normalize a group name
pub fn validate_group_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::validation("group name is required"));
    }
    if name.len() > MAX_GROUP_NAME_LEN {
        return Err(Error::validation(format!(
            "group name must be at most {} characters",
            MAX_GROUP_NAME_LEN
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(Error::validation(format!(
            "group name {:?} may only contain letters, digits, '-', '_' and '.'",
            name
        )));
    }
    Ok(name.to_string())
}

fn group_from_row(row: &Row<'_>) -> rusqlite::Result<Group> {
    Ok(Group {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn fetch_group(conn: &Connection, name: &str) -> Result<Option<Group>> {
    let group = conn
        .query_row(
            "SELECT id, name, description, created_at, updated_at FROM ip_groups WHERE name = ?1",
            params![name],
            group_from_row,
        )
        .optional()?;
    Ok(group)
}

fn count_group_addresses(conn: &Connection, name: &str) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM ip_addresses WHERE group_name = ?1",
        params![name],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn normalize_description(description: Option<&str>) -> Option<String> {
    description
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(String::from)
}

impl Database {
    pub fn create_group(&self, name: &str, description: Option<&str>) -> Result<Group> {
        let name = validate_group_name(name)?;
        let description = normalize_description(description);
        let now = now_epoch_secs();

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO ip_groups (name, description, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
            params![name, description, now, now],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::AlreadyExists {
                    kind: "group".to_string(),
                    id: name.clone(),
                }
            } else {
                e.into()
            }
        })?;

        info!("Created group {}", name);
        Ok(Group {
            id: conn.last_insert_rowid(),
            name,
            description,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get_group(&self, name: &str) -> Result<Option<Group>> {
        let conn = self.conn.lock();
        fetch_group(&conn, name)
    }

    /// Group directory lookup used to vet bulk requests
    pub fn group_exists(&self, name: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM ip_groups WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn list_groups(&self) -> Result<Vec<GroupSummary>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT g.id, g.name, g.description, g.created_at, g.updated_at,
                    COUNT(a.id), COALESCE(SUM(a.available_for_user), 0)
             FROM ip_groups g
             LEFT JOIN ip_addresses a ON a.group_name = g.name
             GROUP BY g.id
             ORDER BY g.name",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(GroupSummary {
                group: group_from_row(row)?,
                address_count: row.get(5)?,
                available_count: row.get(6)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Rename and/or re-describe a group. Renames cascade to its addresses.
    pub fn update_group(
        &self,
        name: &str,
        new_name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Group> {
        let new_name = new_name.map(validate_group_name).transpose()?;
        let description = normalize_description(description);
        let now = now_epoch_secs();

        let conn = self.conn.lock();
        let current = fetch_group(&conn, name)?.ok_or_else(|| Error::not_found("group", name))?;
        let target = new_name.unwrap_or_else(|| current.name.clone());

        conn.execute(
            "UPDATE ip_groups SET name = ?1, description = ?2, updated_at = ?3 WHERE id = ?4",
            params![target, description, now, current.id],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::AlreadyExists {
                    kind: "group".to_string(),
                    id: target.clone(),
                }
            } else {
                e.into()
            }
        })?;

        if target != current.name {
            info!("Renamed group {} to {}", current.name, target);
        }

        fetch_group(&conn, &target)?.ok_or_else(|| Error::not_found("group", &target))
    }

    /// Delete a group that no address references anymore
    pub fn delete_group(&self, name: &str) -> Result<()> {
        let conn = self.conn.lock();
        if fetch_group(&conn, name)?.is_none() {
            return Err(Error::not_found("group", name));
        }

        let count = count_group_addresses(&conn, name)?;
        if count > 0 {
            return Err(Error::GroupInUse {
                name: name.to_string(),
                count,
            });
        }

        conn.execute("DELETE FROM ip_groups WHERE name = ?1", params![name])?;
        info!("Deleted group {}", name);
        Ok(())
    }
}
