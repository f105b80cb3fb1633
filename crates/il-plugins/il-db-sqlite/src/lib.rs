//! # il-db-sqlite Implementation
//!
//! This module implements the data mapping between the SQLite relational model
//! and the `il-core` domain models. Ids are stored as 16-byte blobs, durations
//! as whole seconds and the site settings as a single JSON document.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use il_core::error::AppError;
use il_core::models::{
    validate_choices, Activity, ActivityChoice, CasAccount, Color, Participant, School, SiteSettings, Slot, User,
};
use il_core::traits::{AccountRepo, PlanningRepo};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use uuid::Uuid;

const SCHEMA: &str = include_str!("schema.sql");

#[derive(Clone)]
pub struct SqlitePlanningRepo {
    pool: SqlitePool,
}

impl SqlitePlanningRepo {
    /// Opens (or creates) the database and makes sure every table exists.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to `:memory:` is a separate database.
        let in_memory = database_url.contains(":memory:");
        let pool = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new().max_connections(5).connect_with(options).await?
        };

        let repo = Self { pool };
        repo.bootstrap().await?;
        tracing::info!(in_memory, "sqlite store ready");
        Ok(repo)
    }

    /// Creates missing tables. Safe to run on every start.
    pub async fn bootstrap(&self) -> anyhow::Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

// Helpers for UUID conversion
fn uuid_to_blob(id: Uuid) -> Vec<u8> {
    id.as_bytes().to_vec()
}

fn blob_to_uuid(blob: &[u8]) -> anyhow::Result<Uuid> {
    Ok(Uuid::from_slice(blob)?)
}

fn get_uuid(row: &SqliteRow, column: &str) -> anyhow::Result<Uuid> {
    blob_to_uuid(&row.try_get::<Vec<u8>, _>(column)?)
}

fn get_opt_uuid(row: &SqliteRow, column: &str) -> anyhow::Result<Option<Uuid>> {
    row.try_get::<Option<Vec<u8>>, _>(column)?
        .map(|blob| blob_to_uuid(&blob))
        .transpose()
}

fn get_u32(row: &SqliteRow, column: &str) -> anyhow::Result<u32> {
    Ok(u32::try_from(row.try_get::<i64, _>(column)?)?)
}

fn get_duration(row: &SqliteRow, column: &str) -> anyhow::Result<Option<TimeDelta>> {
    Ok(row.try_get::<Option<i64>, _>(column)?.and_then(TimeDelta::try_seconds))
}

fn row_to_user(row: &SqliteRow) -> anyhow::Result<User> {
    Ok(User {
        id: get_uuid(row, "id")?,
        email: row.try_get("email")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        is_active: row.try_get("is_active")?,
        is_superuser: row.try_get("is_superuser")?,
        last_login: row.try_get("last_login")?,
    })
}

fn row_to_activity(row: &SqliteRow) -> anyhow::Result<Activity> {
    Ok(Activity {
        id: get_uuid(row, "id")?,
        title: row.try_get("title")?,
        display: row.try_get("display")?,
        year: row.try_get("year")?,
        host_id: get_opt_uuid(row, "host_id")?,
        host_name: row.try_get("host_name")?,
        host_email: row.try_get("host_email")?,
        must_subscribe: row.try_get("must_subscribe")?,
        communicate_participants: row.try_get("communicate_participants")?,
        max_participants: get_u32(row, "max_participants")?,
        min_participants: get_u32(row, "min_participants")?,
        duration: get_duration(row, "duration_secs")?,
        desired_slot_nb: get_u32(row, "desired_slot_nb")?,
    })
}

fn row_to_slot(row: &SqliteRow) -> anyhow::Result<Slot> {
    Ok(Slot {
        id: get_uuid(row, "id")?,
        activity_id: get_uuid(row, "activity_id")?,
        title: row.try_get("title")?,
        start: row.try_get::<Option<DateTime<Utc>>, _>("start")?,
        duration: get_duration(row, "duration_secs")?,
        room: row.try_get("room")?,
        on_planning: row.try_get("on_planning")?,
        on_activity: row.try_get("on_activity")?,
        subscribing_open: row.try_get("subscribing_open")?,
        color: row.try_get::<String, _>("color")?.parse::<Color>()?,
    })
}

fn row_to_participant(row: &SqliteRow) -> anyhow::Result<Participant> {
    Ok(Participant {
        id: get_uuid(row, "id")?,
        user_id: get_uuid(row, "user_id")?,
        school: row
            .try_get::<Option<String>, _>("school")?
            .map(|code| code.parse::<School>())
            .transpose()?,
        is_registered: row.try_get("is_registered")?,
        paid: row.try_get("paid")?,
        sleeps: row.try_get("sleeps")?,
        meals: serde_json::from_str(&row.try_get::<String, _>("meals")?)?,
        options: serde_json::from_str(&row.try_get::<String, _>("options")?)?,
    })
}

fn row_to_choice(row: &SqliteRow) -> anyhow::Result<ActivityChoice> {
    Ok(ActivityChoice {
        participant_id: get_uuid(row, "participant_id")?,
        slot_id: get_uuid(row, "slot_id")?,
        priority: get_u32(row, "priority")?,
        accepted: row.try_get("accepted")?,
    })
}

#[async_trait]
impl PlanningRepo for SqlitePlanningRepo {
    async fn list_users(&self) -> anyhow::Result<Vec<User>> {
        let rows = sqlx::query("SELECT * FROM users ORDER BY email")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_user).collect()
    }

    async fn list_activities(&self) -> anyhow::Result<Vec<Activity>> {
        let rows = sqlx::query("SELECT * FROM activities ORDER BY year DESC, title")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_activity).collect()
    }

    async fn list_slots(&self) -> anyhow::Result<Vec<Slot>> {
        let rows = sqlx::query("SELECT * FROM slots ORDER BY start")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_slot).collect()
    }

    async fn list_participants(&self) -> anyhow::Result<Vec<Participant>> {
        let rows = sqlx::query("SELECT * FROM participants")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_participant).collect()
    }

    async fn list_choices(&self) -> anyhow::Result<Vec<ActivityChoice>> {
        let rows = sqlx::query("SELECT * FROM activity_choices ORDER BY participant_id, priority")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_choice).collect()
    }

    async fn load_settings(&self) -> anyhow::Result<SiteSettings> {
        let row = sqlx::query("SELECT data FROM site_settings WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(serde_json::from_str(&row.try_get::<String, _>("data")?)?),
            None => Ok(SiteSettings::default()),
        }
    }

    async fn save_settings(&self, settings: SiteSettings) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO site_settings (id, data) VALUES (1, ?) \
             ON CONFLICT(id) DO UPDATE SET data = excluded.data",
        )
        .bind(serde_json::to_string(&settings)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_user(&self, user: User) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO users (id, email, first_name, last_name, is_active, is_superuser, last_login) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET email = excluded.email, first_name = excluded.first_name, \
             last_name = excluded.last_name, is_active = excluded.is_active, \
             is_superuser = excluded.is_superuser, last_login = excluded.last_login",
        )
        .bind(uuid_to_blob(user.id))
        .bind(user.email)
        .bind(user.first_name)
        .bind(user.last_name)
        .bind(user.is_active)
        .bind(user.is_superuser)
        .bind(user.last_login)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_activity(&self, activity: Activity) -> anyhow::Result<()> {
        if activity.desired_slot_nb == 0 {
            return Err(AppError::ValidationError("an activity needs at least one slot".into()).into());
        }
        sqlx::query(
            "INSERT INTO activities (id, title, display, year, host_id, host_name, host_email, must_subscribe, \
             communicate_participants, max_participants, min_participants, duration_secs, desired_slot_nb) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET title = excluded.title, display = excluded.display, \
             year = excluded.year, host_id = excluded.host_id, host_name = excluded.host_name, \
             host_email = excluded.host_email, must_subscribe = excluded.must_subscribe, \
             communicate_participants = excluded.communicate_participants, \
             max_participants = excluded.max_participants, min_participants = excluded.min_participants, \
             duration_secs = excluded.duration_secs, desired_slot_nb = excluded.desired_slot_nb",
        )
        .bind(uuid_to_blob(activity.id))
        .bind(activity.title)
        .bind(activity.display)
        .bind(activity.year)
        .bind(activity.host_id.map(uuid_to_blob))
        .bind(activity.host_name)
        .bind(activity.host_email)
        .bind(activity.must_subscribe)
        .bind(activity.communicate_participants)
        .bind(i64::from(activity.max_participants))
        .bind(i64::from(activity.min_participants))
        .bind(activity.duration.map(|d| d.num_seconds()))
        .bind(i64::from(activity.desired_slot_nb))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_slot(&self, slot: Slot) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO slots (id, activity_id, title, start, duration_secs, room, on_planning, on_activity, \
             subscribing_open, color) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET activity_id = excluded.activity_id, title = excluded.title, \
             start = excluded.start, duration_secs = excluded.duration_secs, room = excluded.room, \
             on_planning = excluded.on_planning, on_activity = excluded.on_activity, \
             subscribing_open = excluded.subscribing_open, color = excluded.color",
        )
        .bind(uuid_to_blob(slot.id))
        .bind(uuid_to_blob(slot.activity_id))
        .bind(slot.title)
        .bind(slot.start)
        .bind(slot.duration.map(|d| d.num_seconds()))
        .bind(slot.room)
        .bind(slot.on_planning)
        .bind(slot.on_activity)
        .bind(slot.subscribing_open)
        .bind(slot.color.code())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_participant(&self, participant: Participant) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO participants (id, user_id, school, is_registered, paid, sleeps, meals, options) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET user_id = excluded.user_id, school = excluded.school, \
             is_registered = excluded.is_registered, paid = excluded.paid, sleeps = excluded.sleeps, \
             meals = excluded.meals, options = excluded.options",
        )
        .bind(uuid_to_blob(participant.id))
        .bind(uuid_to_blob(participant.user_id))
        .bind(participant.school.map(School::code))
        .bind(participant.is_registered)
        .bind(participant.paid)
        .bind(participant.sleeps)
        .bind(serde_json::to_string(&participant.meals)?)
        .bind(serde_json::to_string(&participant.options)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Swaps the whole ranked list in one transaction so a participant never
    /// ends up with half of an old list and half of a new one.
    async fn replace_choices(&self, participant_id: Uuid, choices: Vec<ActivityChoice>) -> anyhow::Result<()> {
        if choices.iter().any(|c| c.participant_id != participant_id) {
            return Err(AppError::ValidationError("choices belong to another participant".into()).into());
        }
        validate_choices(&choices)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM activity_choices WHERE participant_id = ?")
            .bind(uuid_to_blob(participant_id))
            .execute(&mut *tx)
            .await?;

        for choice in &choices {
            sqlx::query("INSERT INTO activity_choices (participant_id, slot_id, priority, accepted) VALUES (?, ?, ?, ?)")
                .bind(uuid_to_blob(choice.participant_id))
                .bind(uuid_to_blob(choice.slot_id))
                .bind(i64::from(choice.priority))
                .bind(choice.accepted)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn set_accepted(&self, participant_id: Uuid, slot_id: Uuid, accepted: bool) -> anyhow::Result<()> {
        let result = sqlx::query("UPDATE activity_choices SET accepted = ? WHERE participant_id = ? AND slot_id = ?")
            .bind(accepted)
            .bind(uuid_to_blob(participant_id))
            .bind(uuid_to_blob(slot_id))
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("choice".into(), format!("{participant_id}/{slot_id}")).into());
        }
        Ok(())
    }
}

async fn insert_cas_user(
    conn: &mut SqliteConnection,
    email: &str,
    cas_login: &str,
    unique_id: &str,
) -> anyhow::Result<User> {
    let user = User {
        id: Uuid::now_v7(),
        email: email.to_string(),
        first_name: String::new(),
        last_name: String::new(),
        is_active: true,
        is_superuser: false,
        last_login: None,
    };

    sqlx::query("INSERT INTO users (id, email, first_name, last_name, is_active, is_superuser) VALUES (?, ?, '', '', 1, 0)")
        .bind(uuid_to_blob(user.id))
        .bind(&user.email)
        .execute(&mut *conn)
        .await?;

    sqlx::query("INSERT INTO cas_accounts (user_id, unique_id, cas_login) VALUES (?, ?, ?)")
        .bind(uuid_to_blob(user.id))
        .bind(unique_id)
        .bind(cas_login)
        .execute(&mut *conn)
        .await?;

    Ok(user)
}

#[async_trait]
impl AccountRepo for SqlitePlanningRepo {
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn find_cas_account(&self, user_id: Uuid) -> anyhow::Result<Option<CasAccount>> {
        let row = sqlx::query("SELECT user_id, unique_id, cas_login FROM cas_accounts WHERE user_id = ?")
            .bind(uuid_to_blob(user_id))
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(CasAccount {
                user_id: get_uuid(&row, "user_id")?,
                unique_id: row.try_get("unique_id")?,
                cas_login: row.try_get("cas_login")?,
            })),
            None => Ok(None),
        }
    }

    /// The user and its CAS account are written together or not at all.
    async fn create_cas_user(&self, email: &str, cas_login: &str, unique_id: &str) -> anyhow::Result<User> {
        let mut tx = self.pool.begin().await?;
        let user = insert_cas_user(&mut *tx, email, cas_login, unique_id).await?;
        tx.commit().await?;
        tracing::info!(user_id = %user.id, "created CAS user");
        Ok(user)
    }

    /// Deleting the stale user and creating its replacement share one
    /// transaction: if the insert fails, the stale user is kept.
    async fn replace_with_cas_user(
        &self,
        stale_id: Uuid,
        email: &str,
        cas_login: &str,
        unique_id: &str,
    ) -> anyhow::Result<User> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(uuid_to_blob(stale_id))
            .execute(&mut *tx)
            .await?;
        let user = insert_cas_user(&mut *tx, email, cas_login, unique_id).await?;

        tx.commit().await?;
        tracing::info!(user_id = %user.id, stale_id = %stale_id, "replaced stale user with a CAS user");
        Ok(user)
    }

    async fn delete_user(&self, user_id: Uuid) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(uuid_to_blob(user_id))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn touch_login(&self, user_id: Uuid, at: DateTime<Utc>) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
            .bind(at)
            .bind(uuid_to_blob(user_id))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use il_core::cas::authenticate_cas;
    use il_core::models::{Meal, Price};
    use il_core::traits::CasIdentity;
    use rust_decimal::Decimal;
    use std::collections::BTreeSet;

    async fn repo() -> SqlitePlanningRepo {
        SqlitePlanningRepo::new("sqlite::memory:").await.unwrap()
    }

    fn user(email: &str) -> User {
        User {
            id: Uuid::now_v7(),
            email: email.into(),
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            is_active: true,
            is_superuser: false,
            last_login: None,
        }
    }

    fn activity() -> Activity {
        Activity {
            id: Uuid::now_v7(),
            title: "Loup-garou".into(),
            display: true,
            year: 2025,
            host_id: None,
            host_name: Some("Bob".into()),
            host_email: "bob@example.org".into(),
            must_subscribe: true,
            communicate_participants: false,
            max_participants: 12,
            min_participants: 6,
            duration: Some(TimeDelta::minutes(45)),
            desired_slot_nb: 2,
        }
    }

    fn slot(activity_id: Uuid) -> Slot {
        Slot {
            id: Uuid::now_v7(),
            activity_id,
            title: "{act_title}".into(),
            start: Some(Utc.with_ymd_and_hms(2025, 3, 8, 14, 0, 0).unwrap()),
            duration: None,
            room: Some("U209".into()),
            on_planning: true,
            on_activity: true,
            subscribing_open: true,
            color: Color::Blue,
        }
    }

    fn participant(user_id: Uuid) -> Participant {
        Participant {
            id: Uuid::now_v7(),
            user_id,
            school: Some(School::Rennes),
            is_registered: true,
            paid: false,
            sleeps: true,
            meals: BTreeSet::from([Meal::SaturdayMidday]),
            options: BTreeSet::from([3]),
        }
    }

    #[tokio::test]
    async fn test_planning_rows_round_trip() {
        let repo = repo().await;
        let user = user("jdoe@example.org");
        let act = activity();
        let slot = slot(act.id);
        let participant = participant(user.id);

        repo.save_user(user.clone()).await.unwrap();
        repo.save_activity(act.clone()).await.unwrap();
        repo.save_slot(slot.clone()).await.unwrap();
        repo.save_participant(participant.clone()).await.unwrap();

        assert_eq!(repo.list_users().await.unwrap(), vec![user]);
        assert_eq!(repo.list_activities().await.unwrap(), vec![act]);
        assert_eq!(repo.list_slots().await.unwrap(), vec![slot]);
        assert_eq!(repo.list_participants().await.unwrap(), vec![participant]);
    }

    #[tokio::test]
    async fn test_save_updates_in_place() {
        let repo = repo().await;
        let mut act = activity();
        repo.save_activity(act.clone()).await.unwrap();

        act.display = false;
        act.duration = None;
        repo.save_activity(act.clone()).await.unwrap();

        let stored = repo.list_activities().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert!(!stored[0].display);
        assert_eq!(stored[0].duration, None);
    }

    #[tokio::test]
    async fn test_zero_slot_activity_is_refused() {
        let repo = repo().await;
        let act = Activity { desired_slot_nb: 0, ..activity() };
        assert!(repo.save_activity(act).await.is_err());
    }

    #[tokio::test]
    async fn test_settings_default_then_saved() {
        let repo = repo().await;
        assert_eq!(repo.load_settings().await.unwrap(), SiteSettings::default());

        let settings = SiteSettings {
            contact_email: Some("contact@example.org".into()),
            price_entry: Price { paid: Decimal::new(1500, 2), unpaid: Decimal::new(500, 2) },
            ..SiteSettings::default()
        };
        repo.save_settings(settings.clone()).await.unwrap();
        repo.save_settings(settings.clone()).await.unwrap();
        assert_eq!(repo.load_settings().await.unwrap(), settings);
    }

    #[tokio::test]
    async fn test_replace_choices_is_all_or_nothing() {
        let repo = repo().await;
        let user = user("p@example.org");
        let act = activity();
        let (a, b) = (slot(act.id), slot(act.id));
        let participant = participant(user.id);
        repo.save_user(user).await.unwrap();
        repo.save_activity(act).await.unwrap();
        repo.save_slot(a.clone()).await.unwrap();
        repo.save_slot(b.clone()).await.unwrap();
        repo.save_participant(participant.clone()).await.unwrap();

        let choice = |slot_id, priority| ActivityChoice { participant_id: participant.id, slot_id, priority, accepted: false };
        repo.replace_choices(participant.id, vec![choice(a.id, 1), choice(b.id, 2)]).await.unwrap();
        assert_eq!(repo.list_choices().await.unwrap().len(), 2);

        // duplicate priority: rejected before touching the table
        assert!(repo.replace_choices(participant.id, vec![choice(a.id, 1), choice(b.id, 1)]).await.is_err());
        assert_eq!(repo.list_choices().await.unwrap().len(), 2);

        // unknown slot: the insert fails and the delete is rolled back
        assert!(repo.replace_choices(participant.id, vec![choice(Uuid::now_v7(), 1)]).await.is_err());
        assert_eq!(repo.list_choices().await.unwrap().len(), 2);

        repo.replace_choices(participant.id, vec![choice(b.id, 1)]).await.unwrap();
        let choices = repo.list_choices().await.unwrap();
        assert_eq!(choices, vec![choice(b.id, 1)]);
    }

    #[tokio::test]
    async fn test_set_accepted() {
        let repo = repo().await;
        let user = user("p@example.org");
        let act = activity();
        let slot = slot(act.id);
        let participant = participant(user.id);
        repo.save_user(user).await.unwrap();
        repo.save_activity(act).await.unwrap();
        repo.save_slot(slot.clone()).await.unwrap();
        repo.save_participant(participant.clone()).await.unwrap();
        repo.replace_choices(
            participant.id,
            vec![ActivityChoice { participant_id: participant.id, slot_id: slot.id, priority: 1, accepted: false }],
        )
        .await
        .unwrap();

        repo.set_accepted(participant.id, slot.id, true).await.unwrap();
        assert!(repo.list_choices().await.unwrap()[0].accepted);

        assert!(repo.set_accepted(participant.id, Uuid::now_v7(), true).await.is_err());
    }

    #[tokio::test]
    async fn test_cas_user_lifecycle() {
        let repo = repo().await;
        let user = repo.create_cas_user("jdoe@ens.fr", "jdoe", "jdoe#/home/jdoe").await.unwrap();

        let found = repo.find_user_by_email("jdoe@ens.fr").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
        let account = repo.find_cas_account(user.id).await.unwrap().unwrap();
        assert_eq!(account.unique_id, "jdoe#/home/jdoe");

        let at = Utc.with_ymd_and_hms(2025, 2, 1, 12, 0, 0).unwrap();
        repo.touch_login(user.id, at).await.unwrap();
        let found = repo.find_user_by_email("jdoe@ens.fr").await.unwrap().unwrap();
        assert_eq!(found.last_login, Some(at));

        repo.delete_user(user.id).await.unwrap();
        assert!(repo.find_user_by_email("jdoe@ens.fr").await.unwrap().is_none());
        assert!(repo.find_cas_account(user.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_unique_id_is_refused() {
        let repo = repo().await;
        repo.create_cas_user("a@ens.fr", "jdoe", "jdoe#/home").await.unwrap();
        assert!(repo.create_cas_user("b@ens.fr", "jdoe", "jdoe#/home").await.is_err());
        // the user row of the failed attempt was rolled back
        assert!(repo.find_user_by_email("b@ens.fr").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replace_with_cas_user() {
        let repo = repo().await;
        let stale = user("a@ens.fr");
        repo.save_user(stale.clone()).await.unwrap();

        let user = repo.replace_with_cas_user(stale.id, "a@ens.fr", "jdoe", "jdoe#/home/jdoe").await.unwrap();
        assert_ne!(user.id, stale.id);
        let found = repo.find_user_by_email("a@ens.fr").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert!(repo.find_cas_account(user.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_cas_login_keeps_stale_account() {
        let repo = repo().await;
        let stale = user("a@ens.fr");
        repo.save_user(stale.clone()).await.unwrap();
        repo.create_cas_user("b@ens.fr", "jdoe", "jdoe#/home/jdoe").await.unwrap();

        let identity = CasIdentity {
            login: "jdoe".into(),
            home_directory: "/home/jdoe".into(),
            email: "a@ens.fr".into(),
        };
        let now = Utc.with_ymd_and_hms(2025, 2, 1, 12, 0, 0).unwrap();
        // the unique id already belongs to b@ens.fr, so the insert fails
        assert!(authenticate_cas(&repo, &identity, now).await.is_err());

        let kept = repo.find_user_by_email("a@ens.fr").await.unwrap().unwrap();
        assert_eq!(kept.id, stale.id);
    }
}
