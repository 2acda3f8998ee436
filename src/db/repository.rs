//! Generic CRUD repository over the key-value store.
//!
//! Mutations are optimistic: the versionstamp read with a record is the
//! precondition for writing it back, so a concurrent writer turns the second
//! commit into [`WriteOutcome::Conflict`] instead of a lost update.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;

use super::models::{Appointment, AppointmentPatch, Patient, PatientRequest, Room, RoomRequest};
use crate::kv::{AtomicOperation, CommitResult, KvError, KvKey, KvStore, Versionstamp};

/// A record type stored under `[COLLECTION, id]`.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: &'static str;

    /// Partial update applied by [`Repository::update`]
    type Patch: Send;

    fn id(&self) -> &str;

    fn apply(&mut self, patch: Self::Patch);

    /// Refresh `updated_at`
    fn touch(&mut self, now: DateTime<Utc>);
}

/// Result of a conditional write. Store failures travel separately as `Err(KvError)`.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome<T> {
    Committed(T),
    /// The record changed (or appeared) since it was read
    Conflict,
    NotFound,
}

impl<T> WriteOutcome<T> {
    pub fn is_committed(&self) -> bool {
        matches!(self, WriteOutcome::Committed(_))
    }

    pub fn committed(self) -> Option<T> {
        match self {
            WriteOutcome::Committed(value) => Some(value),
            _ => None,
        }
    }
}

/// A record plus the versionstamp it was read at
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub value: T,
    pub versionstamp: Versionstamp,
}

pub struct Repository<T> {
    store: Arc<dyn KvStore>,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> Repository<T> {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            _entity: PhantomData,
        }
    }

    fn key(id: &str) -> KvKey {
        KvKey::new([T::COLLECTION, id])
    }

    pub async fn get_all(&self) -> Result<Vec<T>, KvError> {
        self.store
            .list(&KvKey::new([T::COLLECTION]))
            .await?
            .iter()
            .map(|entry| entry.decode())
            .collect()
    }

    pub async fn count(&self) -> Result<usize, KvError> {
        Ok(self.store.list(&KvKey::new([T::COLLECTION])).await?.len())
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<T>, KvError> {
        Ok(self.get_entry(id).await?.map(|v| v.value))
    }

    pub async fn get_entry(&self, id: &str) -> Result<Option<Versioned<T>>, KvError> {
        match self.store.find(&Self::key(id)).await? {
            Some(entry) => Ok(Some(Versioned {
                value: entry.decode()?,
                versionstamp: entry.versionstamp,
            })),
            None => Ok(None),
        }
    }

    /// Insert a new record. Reports `Conflict` if the id is already taken.
    pub async fn create(&self, entity: T) -> Result<WriteOutcome<T>, KvError> {
        let key = Self::key(entity.id());
        let op = AtomicOperation::new()
            .check(key.clone(), None)
            .set(key, &entity)?;

        Ok(match self.store.commit(op).await? {
            CommitResult::Committed(_) => WriteOutcome::Committed(entity),
            CommitResult::CheckFailed => WriteOutcome::Conflict,
        })
    }

    pub async fn update(&self, id: &str, patch: T::Patch) -> Result<WriteOutcome<T>, KvError> {
        self.modify(id, |entity| entity.apply(patch)).await
    }

    /// Read, change with `f`, then write back only if nobody else wrote in between.
    pub async fn modify<F>(&self, id: &str, f: F) -> Result<WriteOutcome<T>, KvError>
    where
        F: FnOnce(&mut T) + Send,
    {
        match self.get_entry(id).await? {
            Some(current) => self.commit_modify(current, f).await,
            None => Ok(WriteOutcome::NotFound),
        }
    }

    pub async fn commit_update(
        &self,
        current: Versioned<T>,
        patch: T::Patch,
    ) -> Result<WriteOutcome<T>, KvError> {
        self.commit_modify(current, |entity| entity.apply(patch)).await
    }

    /// Write a changed copy of `current`, guarded by its versionstamp.
    pub async fn commit_modify<F>(&self, current: Versioned<T>, f: F) -> Result<WriteOutcome<T>, KvError>
    where
        F: FnOnce(&mut T) + Send,
    {
        let Versioned {
            value: mut entity,
            versionstamp,
        } = current;
        f(&mut entity);
        entity.touch(Utc::now());

        let key = Self::key(entity.id());
        let op = AtomicOperation::new()
            .check(key.clone(), Some(versionstamp))
            .set(key, &entity)?;

        Ok(match self.store.commit(op).await? {
            CommitResult::Committed(_) => WriteOutcome::Committed(entity),
            CommitResult::CheckFailed => WriteOutcome::Conflict,
        })
    }

    /// Delete by id, returning the removed record.
    pub async fn delete(&self, id: &str) -> Result<WriteOutcome<T>, KvError> {
        match self.get_entry(id).await? {
            Some(current) => self.commit_delete(current).await,
            None => Ok(WriteOutcome::NotFound),
        }
    }

    pub async fn commit_delete(&self, current: Versioned<T>) -> Result<WriteOutcome<T>, KvError> {
        let key = Self::key(current.value.id());
        let op = AtomicOperation::new()
            .check(key.clone(), Some(current.versionstamp))
            .delete(key);

        Ok(match self.store.commit(op).await? {
            CommitResult::Committed(_) => WriteOutcome::Committed(current.value),
            CommitResult::CheckFailed => WriteOutcome::Conflict,
        })
    }
}

impl Entity for Patient {
    const COLLECTION: &'static str = "patients";
    type Patch = PatientRequest;

    fn id(&self) -> &str {
        &self.id
    }

    fn apply(&mut self, patch: PatientRequest) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if patch.email.is_some() {
            self.email = patch.email;
        }
        if patch.phone.is_some() {
            self.phone = patch.phone;
        }
        if patch.date_of_birth.is_some() {
            self.date_of_birth = patch.date_of_birth;
        }
        if patch.gender.is_some() {
            self.gender = patch.gender;
        }
        if patch.address.is_some() {
            self.address = patch.address;
        }
        if patch.emergency_contact.is_some() {
            self.emergency_contact = patch.emergency_contact;
        }
        if patch.medical_history.is_some() {
            self.medical_history = patch.medical_history;
        }
        if patch.notes.is_some() {
            self.notes = patch.notes;
        }
        if let Some(active) = patch.is_active {
            self.is_active = active;
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

impl Entity for Room {
    const COLLECTION: &'static str = "rooms";
    type Patch = RoomRequest;

    fn id(&self) -> &str {
        &self.id
    }

    /// The room id is immutable; `patch.id` is ignored.
    fn apply(&mut self, patch: RoomRequest) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if patch.room_type.is_some() {
            self.room_type = patch.room_type;
        }
        if patch.capacity.is_some() {
            self.capacity = patch.capacity;
        }
        if let Some(equipment) = patch.equipment {
            self.equipment = equipment;
        }
        if let Some(available) = patch.is_available {
            self.is_available = available;
        }
        if patch.description.is_some() {
            self.description = patch.description;
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

impl Entity for Appointment {
    const COLLECTION: &'static str = "appointments";
    type Patch = AppointmentPatch;

    fn id(&self) -> &str {
        &self.id
    }

    fn apply(&mut self, patch: AppointmentPatch) {
        if let Some(patient_name) = patch.patient_name {
            self.patient_name = patient_name;
        }
        if let Some(email) = patch.psychologist_email {
            self.psychologist_email = email;
        }
        if patch.psychologist_name.is_some() {
            self.psychologist_name = patch.psychologist_name;
        }
        if let Some(date) = patch.appointment_date {
            self.appointment_date = date;
        }
        if let Some(time) = patch.appointment_time {
            self.appointment_time = time;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if patch.notes.is_some() {
            self.notes = patch.notes;
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}
