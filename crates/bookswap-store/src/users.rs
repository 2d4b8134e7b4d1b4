//! CRUD operations for [`User`] records.

use chrono::Utc;
use rusqlite::params;

use crate::database::Database;
use crate::error::{map_constraint, map_not_found, Result};
use crate::models::{ts_from_sql, User, UserId};

const USER_COLUMNS: &str = "id, email, username, full_name, city, about, created_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new user.  Email and username are unique; a duplicate returns
    /// [`StoreError::Conflict`](crate::StoreError::Conflict).
    pub fn create_user(
        &self,
        email: &str,
        username: &str,
        full_name: Option<&str>,
        city: Option<&str>,
        about: Option<&str>,
    ) -> Result<User> {
        let now = Utc::now();

        self.conn()
            .execute(
                "INSERT INTO users (email, username, full_name, city, about, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![email, username, full_name, city, about, now.to_rfc3339()],
            )
            .map_err(map_constraint)?;

        Ok(User {
            id: UserId(self.conn().last_insert_rowid()),
            email: email.to_string(),
            username: username.to_string(),
            full_name: full_name.map(str::to_string),
            city: city.map(str::to_string),
            about: about.map(str::to_string),
            created_at: now,
        })
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single user by id.
    pub fn get_user(&self, id: UserId) -> Result<User> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id.0],
                row_to_user,
            )
            .map_err(map_not_found)
    }

    /// Fetch a single user by username.
    pub fn get_user_by_username(&self, username: &str) -> Result<User> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                params![username],
                row_to_user,
            )
            .map_err(map_not_found)
    }
}

/// Map a `rusqlite::Row` to a [`User`].
fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let created_str: String = row.get(6)?;

    Ok(User {
        id: UserId(row.get(0)?),
        email: row.get(1)?,
        username: row.get(2)?,
        full_name: row.get(3)?,
        city: row.get(4)?,
        about: row.get(5)?,
        created_at: ts_from_sql(6, &created_str)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::testutil::open_temp;
    use crate::StoreError;

    #[test]
    fn create_and_fetch() {
        let (_dir, db) = open_temp();

        let user = db
            .create_user("ada@example.com", "ada", Some("Ada L."), Some("London"), None)
            .unwrap();

        let by_id = db.get_user(user.id).unwrap();
        assert_eq!(by_id, user);

        let by_name = db.get_user_by_username("ada").unwrap();
        assert_eq!(by_name.id, user.id);
    }

    #[test]
    fn duplicate_username_conflicts() {
        let (_dir, db) = open_temp();

        db.create_user("a@example.com", "dup", None, None, None)
            .unwrap();
        let err = db
            .create_user("b@example.com", "dup", None, None, None)
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
    }

    #[test]
    fn missing_user_is_not_found() {
        let (_dir, db) = open_temp();
        let err = db.get_user_by_username("ghost").unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }
}
