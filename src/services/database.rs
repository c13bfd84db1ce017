use anyhow::{anyhow, Result};
use chrono::Utc;
use surrealdb::engine::local::{Db, File, Mem};
use surrealdb::Surreal;
use uuid::Uuid;

use crate::models::{
    common::{PaginatedResponse, PaginationQuery},
    payment::{PaymentRecord, PaymentStatus},
    subscription::Subscription,
    user::{CreateUserRequest, Role, User},
};

#[derive(Clone)]
pub struct DatabaseService {
    db: Surreal<Db>,
}

impl DatabaseService {
    pub async fn new(database_url: &str) -> Result<Self> {
        let db = if database_url.starts_with("memory://") {
            Surreal::new::<Mem>(()).await?
        } else if database_url.starts_with("file://") {
            let path = database_url.strip_prefix("file://").unwrap_or("quizgenix.db");
            Surreal::new::<File>(path).await?
        } else {
            return Err(anyhow!("Unsupported database URL: {}", database_url));
        };

        db.use_ns("quizgenix").use_db("billing").await?;

        let service = Self { db };
        service.initialize_schema().await?;

        Ok(service)
    }

    async fn initialize_schema(&self) -> Result<()> {
        self.db
            .query(
                "
            DEFINE TABLE users SCHEMALESS;
            DEFINE INDEX unique_user_id ON users COLUMNS user_id UNIQUE;
            DEFINE INDEX unique_email ON users COLUMNS email UNIQUE;
        ",
            )
            .await?;

        self.db
            .query(
                "
            DEFINE TABLE payments SCHEMALESS;
            DEFINE INDEX unique_payment_record_id ON payments COLUMNS payment_record_id UNIQUE;
            DEFINE INDEX payment_gateway_id ON payments COLUMNS gateway_payment_id;
        ",
            )
            .await?;

        log::info!("Database schema initialized");
        Ok(())
    }

    // User operations

    pub async fn create_user(&self, request: CreateUserRequest) -> Result<User> {
        if self.get_user_by_email(&request.email).await?.is_some() {
            return Err(anyhow!("User with email {} already exists", request.email));
        }

        let user = User::new(request.first_name, request.last_name, request.email);
        let mut created: Vec<User> = self
            .db
            .query("CREATE users CONTENT $user")
            .bind(("user", &user))
            .await?
            .take(0)?;

        created.pop().ok_or_else(|| anyhow!("Failed to create user"))
    }

    pub async fn get_user(&self, user_id: &Uuid) -> Result<Option<User>> {
        let user: Option<User> = self
            .db
            .query("SELECT * FROM users WHERE user_id = $user_id")
            .bind(("user_id", user_id.to_string()))
            .await?
            .take(0)?;
        Ok(user)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user: Option<User> = self
            .db
            .query("SELECT * FROM users WHERE email = $email")
            .bind(("email", email.to_lowercase()))
            .await?
            .take(0)?;
        Ok(user)
    }

    /// Unconditional subscription write, used by tests to seed state.
    /// Production transitions go through [`Self::normalize_subscription`]
    /// and [`Self::apply_paid_transition`], which only land against the
    /// state they were derived from.
    #[cfg(test)]
    pub async fn update_subscription(
        &self,
        user_id: &Uuid,
        subscription: &Subscription,
    ) -> Result<User> {
        let mut updated: Vec<User> = self
            .db
            .query("UPDATE users SET subscription = $subscription, updated_at = $now WHERE user_id = $user_id")
            .bind(("subscription", subscription))
            .bind(("now", Utc::now()))
            .bind(("user_id", user_id.to_string()))
            .await?
            .take(0)?;

        updated.pop().ok_or_else(|| anyhow!("Failed to update subscription"))
    }

    /// Compare-and-set used by lazy expiry: the reset only lands if the row
    /// still carries the plan and expiry that were read. `Ok(None)` means a
    /// concurrent transition got there first and the caller must re-read.
    pub async fn normalize_subscription(
        &self,
        user_id: &Uuid,
        observed: &Subscription,
        normalized: &Subscription,
    ) -> Result<Option<User>> {
        let mut updated: Vec<User> = self
            .db
            .query(
                "UPDATE users SET subscription = $normalized, updated_at = $now
                 WHERE user_id = $user_id
                   AND subscription.plan = $observed_plan
                   AND subscription.expiry_date = $observed_expiry",
            )
            .bind(("normalized", normalized))
            .bind(("now", Utc::now()))
            .bind(("user_id", user_id.to_string()))
            .bind(("observed_plan", observed.plan))
            .bind(("observed_expiry", observed.expiry_date))
            .await?
            .take(0)?;

        Ok(updated.pop())
    }

    /// Remove the account but keep its payment rows as unlinked financial
    /// history. Both writes commit together.
    pub async fn delete_user(&self, user_id: &Uuid) -> Result<bool> {
        let existing = self.get_user(user_id).await?;
        if existing.is_none() {
            return Ok(false);
        }

        self.db
            .query(
                "
            BEGIN TRANSACTION;
            UPDATE payments SET user_id = NONE WHERE user_id = $user_id;
            DELETE users WHERE user_id = $user_id;
            COMMIT TRANSACTION;
        ",
            )
            .bind(("user_id", user_id.to_string()))
            .await?;

        Ok(true)
    }

    /// Seed or promote the configured admin account. Registration itself
    /// never assigns roles.
    pub async fn ensure_admin(&self, email: &str) -> Result<User> {
        if let Some(user) = self.get_user_by_email(email).await? {
            if user.role == Role::Admin {
                return Ok(user);
            }
            let mut updated: Vec<User> = self
                .db
                .query("UPDATE users SET role = $role, updated_at = $now WHERE email = $email")
                .bind(("role", Role::Admin))
                .bind(("now", Utc::now()))
                .bind(("email", email.to_lowercase()))
                .await?
                .take(0)?;
            return updated.pop().ok_or_else(|| anyhow!("Failed to promote admin"));
        }

        let admin = User::admin(email.to_string());
        let mut created: Vec<User> = self
            .db
            .query("CREATE users CONTENT $user")
            .bind(("user", &admin))
            .await?
            .take(0)?;
        created.pop().ok_or_else(|| anyhow!("Failed to create admin"))
    }

    // Payment operations

    pub async fn create_payment(&self, record: &PaymentRecord) -> Result<PaymentRecord> {
        let mut created: Vec<PaymentRecord> = self
            .db
            .query("CREATE payments CONTENT $payment")
            .bind(("payment", record))
            .await?
            .take(0)?;

        created.pop().ok_or_else(|| anyhow!("Failed to create payment record"))
    }

    /// Lookup used for duplicate-delivery detection on confirmation. Only a
    /// row that actually moved money counts; a failed attempt with the same
    /// gateway id must not satisfy the idempotency check.
    pub async fn get_paid_payment_by_gateway_id(
        &self,
        gateway_payment_id: &str,
    ) -> Result<Option<PaymentRecord>> {
        let payment: Option<PaymentRecord> = self
            .db
            .query(
                "SELECT * FROM payments
                 WHERE gateway_payment_id = $gateway_id AND status = $status
                 LIMIT 1",
            )
            .bind(("gateway_id", gateway_payment_id))
            .bind(("status", PaymentStatus::Paid))
            .await?
            .take(0)?;
        Ok(payment)
    }

    pub async fn list_payments(
        &self,
        pagination: Option<PaginationQuery>,
    ) -> Result<PaginatedResponse<PaymentRecord>> {
        self.paginate_payments("", None, pagination).await
    }

    pub async fn get_payments_by_user(
        &self,
        user_id: &Uuid,
        pagination: Option<PaginationQuery>,
    ) -> Result<PaginatedResponse<PaymentRecord>> {
        self.paginate_payments("WHERE user_id = $user_id", Some(*user_id), pagination)
            .await
    }

    async fn paginate_payments(
        &self,
        filter: &str,
        user_id: Option<Uuid>,
        pagination: Option<PaginationQuery>,
    ) -> Result<PaginatedResponse<PaymentRecord>> {
        let pagination = pagination.unwrap_or_default();
        let page = pagination.page.unwrap_or(1).max(1);
        let limit = pagination.limit.unwrap_or(20).max(1);
        let offset = (page - 1) * limit;

        let count_query = format!("SELECT count() FROM payments {} GROUP ALL", filter);
        let mut query = self.db.query(count_query);
        if let Some(user_id) = user_id {
            query = query.bind(("user_id", user_id.to_string()));
        }
        let total_result: Vec<serde_json::Value> = query.await?.take(0)?;
        let total = extract_count(&total_result);

        let data_query = format!(
            "SELECT * FROM payments {} ORDER BY created_at DESC LIMIT $limit START $offset",
            filter
        );
        let mut query = self
            .db
            .query(data_query)
            .bind(("limit", limit))
            .bind(("offset", offset));
        if let Some(user_id) = user_id {
            query = query.bind(("user_id", user_id.to_string()));
        }
        let payments: Vec<PaymentRecord> = query.await?.take(0)?;

        Ok(PaginatedResponse {
            data: payments,
            total,
            page,
            limit,
            total_pages: (total + limit - 1) / limit,
        })
    }

    /// Payment-confirmation transition: the subscription replacement and the
    /// payment insert commit in one transaction, and a missing user row
    /// aborts it before anything lands. Paid rows get the deterministic
    /// record id `paid:<gateway_payment_id>`, so a second transition for the
    /// same gateway payment fails on the duplicate id and rolls back whole.
    /// `Ok(None)` means the transaction was cancelled and nothing was
    /// written; the caller decides whether that was a duplicate delivery or
    /// a vanished user.
    pub async fn apply_paid_transition(
        &self,
        user_id: &Uuid,
        subscription: &Subscription,
        payment: &PaymentRecord,
    ) -> Result<Option<(User, PaymentRecord)>> {
        let payment_key = payment
            .gateway_payment_id
            .as_deref()
            .map(|gid| format!("paid:{}", gid))
            .ok_or_else(|| anyhow!("paid transition requires a gateway payment id"))?;

        let response = self
            .db
            .query(
                "
            BEGIN TRANSACTION;
            LET $updated = UPDATE users SET subscription = $subscription, updated_at = $now WHERE user_id = $user_id;
            IF array::len($updated) == 0 {
                THROW 'user row missing for paid transition'
            };
            CREATE type::thing('payments', $payment_key) CONTENT $payment;
            SELECT * FROM $updated;
            COMMIT TRANSACTION;
        ",
            )
            .bind(("subscription", subscription))
            .bind(("now", Utc::now()))
            .bind(("user_id", user_id.to_string()))
            .bind(("payment_key", payment_key))
            .bind(("payment", payment))
            .await?;

        let mut response = match response.check() {
            Ok(response) => response,
            Err(err) => {
                log::warn!("Paid transition for {} did not commit: {}", user_id, err);
                return Ok(None);
            }
        };

        let mut payments: Vec<PaymentRecord> = response.take(2)?;
        let mut users: Vec<User> = response.take(3)?;

        match (users.pop(), payments.pop()) {
            (Some(user), Some(payment)) => Ok(Some((user, payment))),
            _ => Ok(None),
        }
    }

    pub async fn health_check(&self) -> Result<()> {
        self.db.health().await?;
        Ok(())
    }
}

fn extract_count(result: &[serde_json::Value]) -> u32 {
    result
        .first()
        .and_then(|v| v.get("count"))
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::plan::PlanCode;
    use rust_decimal::Decimal;

    fn register(first: &str, email: &str) -> CreateUserRequest {
        CreateUserRequest {
            first_name: first.to_string(),
            last_name: "Doe".to_string(),
            email: email.to_string(),
        }
    }

    #[tokio::test]
    async fn test_user_operations() {
        let db = DatabaseService::new("memory://").await.unwrap();

        let user = db.create_user(register("John", "john@example.com")).await.unwrap();
        assert_eq!(user.first_name, "John");
        assert_eq!(user.subscription.plan, PlanCode::Free);

        let retrieved = db.get_user(&user.id).await.unwrap().unwrap();
        assert_eq!(retrieved.email, "john@example.com");

        let by_email = db.get_user_by_email("JOHN@example.com").await.unwrap();
        assert!(by_email.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let db = DatabaseService::new("memory://").await.unwrap();

        db.create_user(register("John", "john@example.com")).await.unwrap();
        let duplicate = db.create_user(register("Johnny", "john@example.com")).await;
        assert!(duplicate.is_err());
    }

    #[tokio::test]
    async fn test_delete_user_unlinks_payments() {
        let db = DatabaseService::new("memory://").await.unwrap();
        let user = db.create_user(register("Jane", "jane@example.com")).await.unwrap();

        let record = PaymentRecord::confirmed(
            user.id,
            Some("order_1".to_string()),
            "pay_1".to_string(),
            Decimal::from(199),
            PlanCode::Monthly,
            &user.email,
            Utc::now(),
        );
        db.create_payment(&record).await.unwrap();

        assert!(db.delete_user(&user.id).await.unwrap());
        assert!(db.get_user(&user.id).await.unwrap().is_none());

        // The payment row survives with its user reference cleared.
        let orphaned = db.get_paid_payment_by_gateway_id("pay_1").await.unwrap().unwrap();
        assert_eq!(orphaned.user_id, None);
        assert_eq!(orphaned.amount_paid, Decimal::from(199));
    }

    #[tokio::test]
    async fn test_ensure_admin_promotes_existing_account() {
        let db = DatabaseService::new("memory://").await.unwrap();
        let user = db.create_user(register("Ada", "ada@example.com")).await.unwrap();
        assert_eq!(user.role, Role::User);

        let admin = db.ensure_admin("ada@example.com").await.unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert_eq!(admin.id, user.id);
    }

    #[tokio::test]
    async fn test_ensure_admin_creates_missing_account() {
        let db = DatabaseService::new("memory://").await.unwrap();
        let admin = db.ensure_admin("root@example.com").await.unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert_eq!(admin.subscription.plan, PlanCode::Free);
    }

    #[tokio::test]
    async fn test_ids_survive_a_store_round_trip() {
        let db = DatabaseService::new("memory://").await.unwrap();

        let user = db.create_user(register("Ray", "ray@example.com")).await.unwrap();
        let fetched = db.get_user(&user.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, user.id);

        let record = PaymentRecord::confirmed(
            user.id,
            Some("order_rt".to_string()),
            "pay_rt".to_string(),
            Decimal::from(199),
            PlanCode::Monthly,
            &user.email,
            Utc::now(),
        );
        let stored = db.create_payment(&record).await.unwrap();
        assert_eq!(stored.id, record.id);
        assert_eq!(stored.user_id, Some(user.id));

        let looked_up = db.get_paid_payment_by_gateway_id("pay_rt").await.unwrap().unwrap();
        assert_eq!(looked_up.id, record.id);
    }

    #[tokio::test]
    async fn test_paid_transition_for_missing_user_writes_nothing() {
        let db = DatabaseService::new("memory://").await.unwrap();
        let ghost = Uuid::new_v4();
        let now = Utc::now();

        let subscription = Subscription::paid_term(PlanCode::Monthly, now).unwrap();
        let record = PaymentRecord::confirmed(
            ghost,
            None,
            "pay_ghost".to_string(),
            Decimal::from(199),
            PlanCode::Monthly,
            "ghost@example.com",
            now,
        );

        let applied = db.apply_paid_transition(&ghost, &subscription, &record).await.unwrap();
        assert!(applied.is_none());

        // The whole transaction rolled back; no orphan payment row exists.
        assert!(db.get_paid_payment_by_gateway_id("pay_ghost").await.unwrap().is_none());
        let all = db.list_payments(None).await.unwrap();
        assert_eq!(all.total, 0);
    }

    #[tokio::test]
    async fn test_duplicate_paid_transition_does_not_commit_twice() {
        let db = DatabaseService::new("memory://").await.unwrap();
        let user = db.create_user(register("Max", "max@example.com")).await.unwrap();
        let now = Utc::now();

        let subscription = Subscription::paid_term(PlanCode::Monthly, now).unwrap();
        let record = PaymentRecord::confirmed(
            user.id,
            None,
            "pay_twice".to_string(),
            Decimal::from(199),
            PlanCode::Monthly,
            &user.email,
            now,
        );
        let first = db.apply_paid_transition(&user.id, &subscription, &record).await.unwrap();
        assert!(first.is_some());

        // Same gateway payment again, even with a fresh record id.
        let redelivered = PaymentRecord::confirmed(
            user.id,
            None,
            "pay_twice".to_string(),
            Decimal::from(199),
            PlanCode::Monthly,
            &user.email,
            now,
        );
        let second = db
            .apply_paid_transition(&user.id, &subscription, &redelivered)
            .await
            .unwrap();
        assert!(second.is_none());

        let payments = db.get_payments_by_user(&user.id, None).await.unwrap();
        assert_eq!(payments.total, 1);
    }

    #[tokio::test]
    async fn test_normalize_only_lands_on_the_observed_state() {
        let db = DatabaseService::new("memory://").await.unwrap();
        let user = db.create_user(register("Eve", "eve@example.com")).await.unwrap();
        let now = Utc::now();

        let stale = Subscription {
            plan: PlanCode::Monthly,
            current_price: Decimal::from(199),
            start_date: Some(now - chrono::Duration::days(31)),
            expiry_date: Some(now - chrono::Duration::days(1)),
        };
        db.update_subscription(&user.id, &stale).await.unwrap();

        // A reset based on state that is no longer current must miss.
        let mut outdated = stale.clone();
        outdated.expiry_date = Some(now - chrono::Duration::days(2));
        let missed = db
            .normalize_subscription(&user.id, &outdated, &Subscription::free())
            .await
            .unwrap();
        assert!(missed.is_none());
        let untouched = db.get_user(&user.id).await.unwrap().unwrap();
        assert_eq!(untouched.subscription, stale);

        let landed = db
            .normalize_subscription(&user.id, &stale, &Subscription::free())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(landed.subscription, Subscription::free());
    }

    #[tokio::test]
    async fn test_payment_listing_is_newest_first() {
        let db = DatabaseService::new("memory://").await.unwrap();
        let user = db.create_user(register("Pat", "pat@example.com")).await.unwrap();

        let older = PaymentRecord {
            created_at: Utc::now() - chrono::Duration::days(2),
            ..PaymentRecord::confirmed(
                user.id,
                None,
                "pay_old".to_string(),
                Decimal::from(199),
                PlanCode::Monthly,
                &user.email,
                Utc::now() - chrono::Duration::days(2),
            )
        };
        let newer = PaymentRecord::confirmed(
            user.id,
            None,
            "pay_new".to_string(),
            Decimal::from(1400),
            PlanCode::Yearly,
            &user.email,
            Utc::now(),
        );
        db.create_payment(&older).await.unwrap();
        db.create_payment(&newer).await.unwrap();

        let page = db.get_payments_by_user(&user.id, None).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.data[0].gateway_payment_id.as_deref(), Some("pay_new"));
        assert_eq!(page.data[1].gateway_payment_id.as_deref(), Some("pay_old"));
    }
}
