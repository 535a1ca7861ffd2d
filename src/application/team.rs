// Team directory - Member listing, role changes and invitations
use crate::application::error::ApiError;
use crate::application::feedback::FailureReporter;
use crate::application::ports::TeamRepository;
use crate::domain::records::{MemberRecord, Role};
use parking_lot::Mutex;
use std::sync::Arc;

pub struct TeamDirectory {
    repository: Arc<dyn TeamRepository>,
    reporter: FailureReporter,
    members: Mutex<Vec<MemberRecord>>,
}

impl TeamDirectory {
    pub fn new(repository: Arc<dyn TeamRepository>, reporter: FailureReporter) -> Self {
        Self {
            repository,
            reporter,
            members: Mutex::new(Vec::new()),
        }
    }

    pub fn members(&self) -> Vec<MemberRecord> {
        self.members.lock().clone()
    }

    pub async fn refresh(&self, organization_id: &str) -> Result<Vec<MemberRecord>, ApiError> {
        let members = self
            .repository
            .list_members(organization_id)
            .await
            .inspect_err(|e| self.reporter.report("load team members", e))?;
        *self.members.lock() = members.clone();
        Ok(members)
    }

    pub async fn change_role(
        &self,
        organization_id: &str,
        user_id: &str,
        role: Role,
    ) -> Result<(), ApiError> {
        self.repository
            .change_role(organization_id, user_id, role)
            .await
            .inspect_err(|e| self.reporter.report("change member role", e))?;

        if let Some(member) = self.members.lock().iter_mut().find(|m| m.user_id == user_id) {
            member.role = role;
        }
        self.reporter
            .success(&format!("Role updated to {}", role.as_str()));
        Ok(())
    }

    pub async fn invite(&self, email: &str, role: Role) -> Result<(), ApiError> {
        let email = email.trim();
        if !email.contains('@') {
            let err = ApiError::Rejected(format!("'{}' is not an email address", email));
            self.reporter.report("invite member", &err);
            return Err(err);
        }
        self.repository
            .invite(email, role)
            .await
            .inspect_err(|e| self.reporter.report("invite member", e))?;
        self.reporter.success(&format!("Invitation sent to {}", email));
        Ok(())
    }
}
