//! In-process store implementing every persistence trait
//!
//! Mirrors the uniqueness and all-or-nothing rules of the Postgres stores:
//! each operation validates against the current state before touching it, so a
//! failed operation leaves nothing behind. Used by the route tests and, through
//! the `test-util` feature, by the worker tests.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use async_trait::async_trait;
use patos_shared::{
    AuthError, AuthResult, Membership, Organization, OrganizationId, OrganizationInvite,
    OrganizationSummary, PasswordReset, UnconfirmedUser, User, UserId,
};
use time::{Duration, OffsetDateTime};

use super::{
    CredentialStore, NewOrganization, OAuthLogin, OrganizationStore, PasswordResetStore,
    ProfileEdit, Registration,
};
use crate::auth::{generate_impossible_hash, hash_password, oauth::OAuthProfile};

const DEFAULT_RESET_TTL: Duration = Duration::days(1);

#[derive(Default)]
struct State {
    last_user_id: i64,
    users: BTreeMap<UserId, User>,
    /// Keyed by email
    pending: HashMap<String, UnconfirmedUser>,
    /// (email, provider)
    oauth_links: HashSet<(String, String)>,
    organizations: HashMap<OrganizationId, Organization>,
    memberships: HashMap<(OrganizationId, UserId), Membership>,
    invites: Vec<OrganizationInvite>,
    resets: Vec<PasswordReset>,
}

impl State {
    fn user_by_email(&self, email: &str) -> Option<&User> {
        self.users.values().find(|u| u.email == email)
    }

    fn insert_user(
        &mut self,
        email: String,
        password_hash: String,
        first_name: String,
        last_name: String,
        date_of_birth: Option<time::Date>,
        avatar_url: Option<String>,
    ) -> User {
        self.last_user_id += 1;
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: UserId(self.last_user_id),
            email,
            password_hash,
            first_name,
            last_name,
            date_of_birth,
            avatar_url,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(user.id, user.clone());
        user
    }
}

pub struct MemoryStore {
    state: RwLock<State>,
    reset_ttl: Duration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_reset_ttl(DEFAULT_RESET_TTL)
    }

    pub fn with_reset_ttl(reset_ttl: Duration) -> Self {
        Self {
            state: RwLock::new(State::default()),
            reset_ttl,
        }
    }

    fn read(&self) -> AuthResult<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| AuthError::Storage("lock poisoned".into()))
    }

    fn write(&self) -> AuthResult<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| AuthError::Storage("lock poisoned".into()))
    }

    /// Members of an organization, ordered by user id
    pub fn members(&self, organization_id: &OrganizationId) -> AuthResult<Vec<Membership>> {
        let state = self.read()?;
        let mut members: Vec<Membership> = state
            .memberships
            .values()
            .filter(|m| &m.organization_id == organization_id)
            .cloned()
            .collect();
        members.sort_by_key(|m| m.user_id);
        Ok(members)
    }

    /// Outstanding invites, expired ones included
    pub fn invite_count(&self) -> AuthResult<usize> {
        Ok(self.read()?.invites.len())
    }

    /// Reset rows held by `user_id`, expired ones included
    pub fn resets_for(&self, user_id: UserId) -> AuthResult<Vec<PasswordReset>> {
        Ok(self
            .read()?
            .resets
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    /// Store a reset row verbatim, bypassing the configured TTL.
    pub fn insert_reset(&self, reset: PasswordReset) -> AuthResult<()> {
        let mut state = self.write()?;
        if state.resets.iter().any(|r| r.otp == reset.otp) {
            return Err(AuthError::conflict("otp already exists"));
        }
        state.resets.push(reset);
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn register_pending(&self, registration: &Registration, otp: &str) -> AuthResult<()> {
        let password_hash = hash_password(&registration.password)?;

        let mut state = self.write()?;
        if state.user_by_email(&registration.email).is_some() {
            return Err(AuthError::conflict("email already registered"));
        }
        if state
            .pending
            .values()
            .any(|p| p.otp == otp && p.email != registration.email)
        {
            return Err(AuthError::conflict("otp already exists"));
        }

        state.pending.insert(
            registration.email.clone(),
            UnconfirmedUser {
                email: registration.email.clone(),
                otp: otp.to_string(),
                password_hash,
                first_name: registration.first_name.clone(),
                last_name: registration.last_name.clone(),
                date_of_birth: registration.date_of_birth,
            },
        );
        Ok(())
    }

    async fn confirm(&self, otp: &str) -> AuthResult<User> {
        let mut state = self.write()?;

        let email = state
            .pending
            .values()
            .find(|p| p.otp == otp)
            .map(|p| p.email.clone())
            .ok_or(AuthError::NotFound)?;
        if state.user_by_email(&email).is_some() {
            return Err(AuthError::conflict("email already registered"));
        }

        let pending = state.pending.remove(&email).ok_or(AuthError::NotFound)?;
        Ok(state.insert_user(
            pending.email,
            pending.password_hash,
            pending.first_name,
            pending.last_name,
            pending.date_of_birth,
            None,
        ))
    }

    async fn login_oauth(&self, profile: &OAuthProfile) -> AuthResult<OAuthLogin> {
        let known = self.read()?.user_by_email(&profile.email).is_some();
        let password_hash = if known {
            None
        } else {
            Some(generate_impossible_hash()?)
        };

        let mut state = self.write()?;
        let (user, created) = match (state.user_by_email(&profile.email).cloned(), password_hash) {
            (Some(user), _) => (user, false),
            (None, Some(password_hash)) => {
                let user = state.insert_user(
                    profile.email.clone(),
                    password_hash,
                    profile.first_name.clone(),
                    profile.last_name.clone(),
                    None,
                    profile.picture_url.clone(),
                );
                (user, true)
            }
            // Deleted between the two lock acquisitions
            (None, None) => return Err(AuthError::Storage("user vanished during oauth login".into())),
        };
        state
            .oauth_links
            .insert((profile.email.clone(), profile.provider.clone()));

        Ok(OAuthLogin { user, created })
    }

    async fn find_user_by_email(&self, email: &str) -> AuthResult<User> {
        self.read()?
            .user_by_email(email)
            .cloned()
            .ok_or(AuthError::NotFound)
    }

    async fn find_user(&self, id: UserId) -> AuthResult<User> {
        self.read()?.users.get(&id).cloned().ok_or(AuthError::NotFound)
    }

    async fn edit_user(&self, id: UserId, edit: &ProfileEdit) -> AuthResult<User> {
        let mut state = self.write()?;
        let user = state.users.get_mut(&id).ok_or(AuthError::NotFound)?;
        user.first_name = edit.first_name.clone();
        user.last_name = edit.last_name.clone();
        user.date_of_birth = edit.date_of_birth;
        user.updated_at = OffsetDateTime::now_utc();
        Ok(user.clone())
    }

    async fn ping(&self) -> AuthResult<()> {
        self.read().map(|_| ())
    }
}

#[async_trait]
impl OrganizationStore for MemoryStore {
    async fn create_organization(&self, organization: &NewOrganization) -> AuthResult<Organization> {
        let mut state = self.write()?;
        if state.organizations.contains_key(&organization.id) {
            return Err(AuthError::conflict("organization already exists"));
        }
        if !state.users.contains_key(&organization.owner_user_id) {
            return Err(AuthError::NotFound);
        }

        let created = Organization {
            id: organization.id.clone(),
            name: organization.name.clone(),
            owner_user_id: organization.owner_user_id,
            billing_plan_id: None,
            created_at: OffsetDateTime::now_utc(),
            deleted_at: None,
        };
        state.organizations.insert(created.id.clone(), created.clone());
        state.memberships.insert(
            (created.id.clone(), created.owner_user_id),
            Membership {
                organization_id: created.id.clone(),
                user_id: created.owner_user_id,
                is_admin: true,
            },
        );
        Ok(created)
    }

    async fn find_organization(&self, id: &OrganizationId) -> AuthResult<Organization> {
        self.read()?
            .organizations
            .get(id)
            .cloned()
            .ok_or(AuthError::NotFound)
    }

    async fn find_membership(&self, organization_id: &OrganizationId, user_id: UserId) -> AuthResult<Membership> {
        self.read()?
            .memberships
            .get(&(organization_id.clone(), user_id))
            .cloned()
            .ok_or(AuthError::NotFound)
    }

    async fn list_user_organizations(&self, user_id: UserId) -> AuthResult<Vec<OrganizationSummary>> {
        let state = self.read()?;
        let mut organizations: Vec<OrganizationSummary> = state
            .memberships
            .values()
            .filter(|m| m.user_id == user_id)
            .filter_map(|m| {
                let org = state.organizations.get(&m.organization_id)?;
                if org.deleted_at.is_some() {
                    return None;
                }
                Some(OrganizationSummary {
                    organization_id: org.id.clone(),
                    organization_name: org.name.clone(),
                    is_admin: m.is_admin,
                    is_owner: org.owner_user_id == user_id,
                })
            })
            .collect();
        organizations.sort_by(|a, b| {
            (&a.organization_name, a.organization_id.as_str())
                .cmp(&(&b.organization_name, b.organization_id.as_str()))
        });
        Ok(organizations)
    }

    async fn create_invite(&self, invite: &OrganizationInvite) -> AuthResult<()> {
        let mut state = self.write()?;
        if state.invites.iter().any(|i| i.otp == invite.otp) {
            return Err(AuthError::conflict("otp already exists"));
        }
        if !state.organizations.contains_key(&invite.organization_id)
            || !state.users.contains_key(&invite.user_id)
        {
            return Err(AuthError::NotFound);
        }
        state.invites.push(invite.clone());
        Ok(())
    }

    async fn accept_invite(&self, otp: &str) -> AuthResult<Membership> {
        let now = OffsetDateTime::now_utc();
        let mut state = self.write()?;

        let position = state
            .invites
            .iter()
            .position(|i| i.otp == otp && !i.is_expired_at(now))
            .ok_or(AuthError::NotFound)?;

        let invite = &state.invites[position];
        let key = (invite.organization_id.clone(), invite.user_id);
        if state.memberships.contains_key(&key) {
            return Err(AuthError::conflict("already a member"));
        }

        let invite = state.invites.remove(position);
        let membership = Membership {
            organization_id: invite.organization_id,
            user_id: invite.user_id,
            is_admin: invite.is_admin,
        };
        state.memberships.insert(key, membership.clone());
        Ok(membership)
    }

    async fn remove_member(&self, organization_id: &OrganizationId, user_id: UserId) -> AuthResult<()> {
        let mut state = self.write()?;
        let owner = state
            .organizations
            .get(organization_id)
            .map(|o| o.owner_user_id)
            .ok_or(AuthError::NotFound)?;
        if owner == user_id {
            return Err(AuthError::conflict("the owner cannot be removed"));
        }
        state
            .memberships
            .remove(&(organization_id.clone(), user_id))
            .map(|_| ())
            .ok_or(AuthError::NotFound)
    }

    async fn transfer_ownership(&self, organization_id: &OrganizationId, new_owner: UserId) -> AuthResult<()> {
        let mut state = self.write()?;
        let key = (organization_id.clone(), new_owner);
        if !state.memberships.contains_key(&key) || !state.organizations.contains_key(organization_id) {
            return Err(AuthError::NotFound);
        }

        if let Some(membership) = state.memberships.get_mut(&key) {
            membership.is_admin = true;
        }
        if let Some(organization) = state.organizations.get_mut(organization_id) {
            organization.owner_user_id = new_owner;
        }
        Ok(())
    }

    async fn sweep_expired_invites(&self) -> AuthResult<u64> {
        let now = OffsetDateTime::now_utc();
        let mut state = self.write()?;
        let before = state.invites.len();
        state.invites.retain(|i| !i.is_expired_at(now));
        Ok((before - state.invites.len()) as u64)
    }
}

#[async_trait]
impl PasswordResetStore for MemoryStore {
    async fn init_reset(&self, user_id: UserId, otp: &str) -> AuthResult<PasswordReset> {
        let reset = PasswordReset {
            user_id,
            otp: otp.to_string(),
            exp: OffsetDateTime::now_utc() + self.reset_ttl,
        };

        {
            let state = self.read()?;
            if !state.users.contains_key(&user_id) {
                return Err(AuthError::NotFound);
            }
        }
        self.insert_reset(reset.clone())?;
        Ok(reset)
    }

    async fn get_valid_reset(&self, otp: &str) -> AuthResult<PasswordReset> {
        let now = OffsetDateTime::now_utc();
        self.read()?
            .resets
            .iter()
            .find(|r| r.otp == otp && !r.is_expired_at(now))
            .cloned()
            .ok_or(AuthError::NotFound)
    }

    async fn complete_reset(&self, user_id: UserId, new_password: &str) -> AuthResult<()> {
        let password_hash = hash_password(new_password)?;
        let now = OffsetDateTime::now_utc();

        let mut state = self.write()?;
        if !state
            .resets
            .iter()
            .any(|r| r.user_id == user_id && !r.is_expired_at(now))
        {
            return Err(AuthError::NotFound);
        }
        let user = state.users.get_mut(&user_id).ok_or(AuthError::NotFound)?;
        user.password_hash = password_hash;
        user.updated_at = now;

        state.resets.retain(|r| r.user_id != user_id);
        Ok(())
    }

    async fn sweep_expired_resets(&self) -> AuthResult<u64> {
        let now = OffsetDateTime::now_utc();
        let mut state = self.write()?;
        let before = state.resets.len();
        state.resets.retain(|r| !r.is_expired_at(now));
        Ok((before - state.resets.len()) as u64)
    }
}
