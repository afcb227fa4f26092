use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink};
use crate::domain::rules::ApprovalRuleSet;
use crate::domain::user::{Role, User, UserId};
use crate::errors::{ApplicationError, DomainError};
use crate::store::ExpenseStore;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub role: Role,
    pub manager_id: Option<UserId>,
}

/// User and rule-set management. Everything except [`Administration::onboard`] requires
/// the acting user to be an admin.
pub struct Administration<S: ExpenseStore + ?Sized> {
    store: Arc<S>,
    audit: Arc<dyn AuditSink>,
}

impl<S: ExpenseStore + ?Sized> Administration<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store, audit: Arc::new(TracingAuditSink) }
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Finds the user registered under `email`, or registers a new employee.
    pub async fn onboard(&self, name: &str, email: &str) -> Result<User, ApplicationError> {
        let email = normalize_email(email)?;
        if let Some(existing) = self.store.find_user_by_email(&email).await? {
            return Ok(existing);
        }

        let name = name.trim();
        let user = User {
            id: UserId(Uuid::new_v4().to_string()),
            name: if name.is_empty() { email.clone() } else { name.to_owned() },
            email,
            role: Role::Employee,
            manager_id: None,
        };
        self.store.save_user(user.clone()).await?;

        self.emit("identity.onboarded", AuditCategory::Identity, &user.id, &user);
        info!(event_name = "identity.onboarded", user_id = %user.id, "new employee registered");
        Ok(user)
    }

    pub async fn create_user(&self, actor: &User, new_user: NewUser) -> Result<User, ApplicationError> {
        require_admin(actor, "create users")?;
        let email = normalize_email(&new_user.email)?;
        if new_user.name.trim().is_empty() {
            return Err(invariant("user name is required"));
        }
        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(invariant(format!("email `{email}` is already registered")));
        }
        if let Some(manager_id) = &new_user.manager_id {
            self.require_user(manager_id).await?;
        }

        let user = User {
            id: UserId(Uuid::new_v4().to_string()),
            name: new_user.name.trim().to_owned(),
            email,
            role: new_user.role,
            manager_id: new_user.manager_id,
        };
        self.store.save_user(user.clone()).await?;
        self.emit("admin.user_created", AuditCategory::Administration, &actor.id, &user);
        Ok(user)
    }

    pub async fn assign_role(
        &self,
        actor: &User,
        user_id: &UserId,
        role: Role,
    ) -> Result<User, ApplicationError> {
        require_admin(actor, "assign roles")?;
        let mut user = self.require_user(user_id).await?;
        user.role = role;
        self.store.save_user(user.clone()).await?;
        self.emit("admin.role_assigned", AuditCategory::Administration, &actor.id, &user);
        Ok(user)
    }

    /// Sets or clears the user's manager. A user cannot manage themselves.
    pub async fn assign_manager(
        &self,
        actor: &User,
        user_id: &UserId,
        manager_id: Option<UserId>,
    ) -> Result<User, ApplicationError> {
        require_admin(actor, "assign managers")?;
        let mut user = self.require_user(user_id).await?;
        if let Some(manager_id) = &manager_id {
            if manager_id == user_id {
                return Err(invariant(format!("user `{user_id}` cannot be their own manager")));
            }
            self.require_user(manager_id).await?;
        }
        user.manager_id = manager_id;
        self.store.save_user(user.clone()).await?;
        self.emit("admin.manager_assigned", AuditCategory::Administration, &actor.id, &user);
        Ok(user)
    }

    /// Swaps in a new active rule set. In-flight expenses pick it up on their next
    /// decision.
    pub async fn replace_rule_set(
        &self,
        actor: &User,
        rule_set: ApprovalRuleSet,
    ) -> Result<ApprovalRuleSet, ApplicationError> {
        require_admin(actor, "replace approval rules")?;
        rule_set.validate()?;
        self.store.save_rule_set(rule_set.clone()).await?;

        self.audit.emit(
            AuditEvent::new(
                None,
                Uuid::new_v4().to_string(),
                "admin.rule_set_replaced",
                AuditCategory::Administration,
                actor.id.0.clone(),
                AuditOutcome::Success,
            )
            .with_metadata("rule_set", rule_set.name.clone())
            .with_metadata("steps", rule_set.steps.len().to_string())
            .with_metadata("min_percent_to_approve", rule_set.min_percent_to_approve.to_string()),
        );
        info!(
            event_name = "admin.rule_set_replaced",
            actor = %actor.id,
            rule_set = %rule_set.name,
            steps = rule_set.steps.len(),
            "approval rules replaced"
        );
        Ok(rule_set)
    }

    async fn require_user(&self, user_id: &UserId) -> Result<User, ApplicationError> {
        self.store.find_user(user_id).await?.ok_or_else(|| ApplicationError::not_found("user", user_id))
    }

    fn emit(&self, event_type: &str, category: AuditCategory, actor: &UserId, user: &User) {
        self.audit.emit(
            AuditEvent::new(
                None,
                Uuid::new_v4().to_string(),
                event_type,
                category,
                actor.0.clone(),
                AuditOutcome::Success,
            )
            .with_metadata("user_id", user.id.0.clone())
            .with_metadata("role", user.role.as_str()),
        );
    }
}

fn require_admin(actor: &User, action: &str) -> Result<(), ApplicationError> {
    if actor.is_admin() {
        return Ok(());
    }
    Err(ApplicationError::Forbidden(format!(
        "only admins can {action}; `{}` is {}",
        actor.id, actor.role
    )))
}

fn normalize_email(email: &str) -> Result<String, ApplicationError> {
    let email = email.trim().to_ascii_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(invariant(format!("`{email}` is not a usable email address")));
    }
    Ok(email)
}

fn invariant(message: impl Into<String>) -> ApplicationError {
    DomainError::InvariantViolation(message.into()).into()
}
