//! The full store surface consumed by services.

use crate::agreements::{
    AgreementArtifactRepository, AgreementRepository, FieldRepository, FieldValueRepository,
    RecipientRepository, SignatureArtifactRepository,
};
use crate::audit::AuditRepository;
use crate::credentials::IntegrationCredentialRepository;
use crate::documents::DocumentRepository;
use crate::jobs::{EmailLogRepository, GoogleImportRunRepository, JobRunRepository};
use crate::outbox::OutboxRepository;
use crate::signing::SigningTokenRepository;
use crate::transaction::TxManager;

/// Every entity facet. Implemented automatically for any type that
/// implements all of them.
pub trait EsignStore:
    DocumentRepository
    + AgreementRepository
    + RecipientRepository
    + FieldRepository
    + FieldValueRepository
    + SignatureArtifactRepository
    + AgreementArtifactRepository
    + AuditRepository
    + SigningTokenRepository
    + JobRunRepository
    + GoogleImportRunRepository
    + EmailLogRepository
    + IntegrationCredentialRepository
    + OutboxRepository
{
}

impl<T> EsignStore for T where
    T: DocumentRepository
        + AgreementRepository
        + RecipientRepository
        + FieldRepository
        + FieldValueRepository
        + SignatureArtifactRepository
        + AgreementArtifactRepository
        + AuditRepository
        + SigningTokenRepository
        + JobRunRepository
        + GoogleImportRunRepository
        + EmailLogRepository
        + IntegrationCredentialRepository
        + OutboxRepository
        + ?Sized
{
}

/// A store that can also open transactions whose write surface is itself a
/// full store.
pub trait TransactionalStore: EsignStore + TxManager<Tx: EsignStore> {}

impl<T> TransactionalStore for T where T: EsignStore + TxManager<Tx: EsignStore> {}
