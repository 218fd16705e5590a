//! gRPC implementation of `companyhub.v1.CompanyService`.
//!
//! Mutations authorize through the [`Validator`] first, commit to the store,
//! and only then hand one [`OutboundEvent`] to the publish queue. Scheduling
//! failures are logged; the committed mutation stands.

use std::sync::Arc;

use chrono::Utc;
use tonic::{Request, Response, Status};

use companyhub_auth::{active_user, verify_password, AuthError, OperationKind, Validator};
use companyhub_core::{Company, CompanyFilters, CompanyId, CompanyKind, DomainError};
use companyhub_events::{EventKind, EventNotifier, OutboundEvent};
use companyhub_infra::{CompanyStore, StoreError, UserStore};

use crate::pb;
use crate::pb::company_service_server::CompanyService;

/// Metadata key carrying the bearer token.
pub const AUTHORIZATION_METADATA: &str = "authorization";

const INVALID_CREDENTIALS: &str = "invalid username or password";

#[derive(Clone)]
pub struct CompanyApi {
    companies: Arc<dyn CompanyStore>,
    users: Arc<dyn UserStore>,
    validator: Validator,
    notifier: EventNotifier,
}

impl CompanyApi {
    pub fn new(
        companies: Arc<dyn CompanyStore>,
        users: Arc<dyn UserStore>,
        validator: Validator,
        notifier: EventNotifier,
    ) -> Self {
        Self {
            companies,
            users,
            validator,
            notifier,
        }
    }

    async fn authorize<T>(&self, request: &Request<T>, operation: OperationKind) -> Result<(), Status> {
        let token = request
            .metadata()
            .get(AUTHORIZATION_METADATA)
            .and_then(|v| v.to_str().ok());

        self.validator
            .validate(token, operation, &[active_user()])
            .await
            .map(|_claims| ())
            .map_err(auth_error_to_status)
    }

    /// Queue a notification; never fails the caller.
    async fn notify(&self, event: OutboundEvent) {
        let company_id = event.entity_id().to_string();
        let kind = event.kind();
        if let Err(err) = self.notifier.notify(event).await {
            tracing::error!(
                company_id = %company_id,
                event = %kind,
                error = %err,
                "unable to schedule event"
            );
        }
    }

    async fn notify_company(&self, company: &Company, kind: EventKind) {
        match OutboundEvent::json(company.id.to_string(), kind, company) {
            Ok(event) => self.notify(event).await,
            Err(err) => tracing::error!(
                company_id = %company.id,
                event = %kind,
                error = %err,
                "unable to marshal event payload"
            ),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Status mapping
// ─────────────────────────────────────────────────────────────────────────────

pub fn auth_error_to_status(err: AuthError) -> Status {
    if err.is_internal() {
        Status::internal("authorization check failed")
    } else {
        Status::unauthenticated(format!("authentication failed: {err}"))
    }
}

pub fn store_error_to_status(err: StoreError) -> Status {
    match err {
        StoreError::NotFound => Status::not_found("object does not exist"),
        StoreError::AlreadyExists(what) => Status::already_exists(format!("object already exists: {what}")),
        StoreError::Backend(msg) => {
            tracing::error!(error = %msg, "storage backend error");
            Status::internal("storage error")
        }
    }
}

fn domain_error_to_status(err: DomainError) -> Status {
    match err {
        DomainError::NotFound => Status::not_found(err.to_string()),
        DomainError::Conflict(_) => Status::already_exists(err.to_string()),
        DomainError::Validation(_) | DomainError::InvalidId(_) => Status::invalid_argument(err.to_string()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversions
// ─────────────────────────────────────────────────────────────────────────────

pub fn kind_to_pb(kind: CompanyKind) -> pb::CompanyType {
    match kind {
        CompanyKind::Corporation => pb::CompanyType::Corporation,
        CompanyKind::NonProfit => pb::CompanyType::NonProfit,
        CompanyKind::Cooperative => pb::CompanyType::Cooperative,
        CompanyKind::SoleProprietorship => pb::CompanyType::SoleProprietorship,
    }
}

/// `None` for `COMPANY_TYPE_UNSPECIFIED`.
pub fn kind_from_pb(value: i32) -> Result<Option<CompanyKind>, Status> {
    let kind = pb::CompanyType::try_from(value)
        .map_err(|_| Status::invalid_argument(format!("unknown company type: {value}")))?;
    Ok(match kind {
        pb::CompanyType::Unspecified => None,
        pb::CompanyType::Corporation => Some(CompanyKind::Corporation),
        pb::CompanyType::NonProfit => Some(CompanyKind::NonProfit),
        pb::CompanyType::Cooperative => Some(CompanyKind::Cooperative),
        pb::CompanyType::SoleProprietorship => Some(CompanyKind::SoleProprietorship),
    })
}

pub fn company_to_pb(company: &Company) -> pb::Company {
    pb::Company {
        id: company.id.to_string(),
        name: company.name.clone(),
        description: company.description.clone(),
        employees_count: company.employees_count,
        registered: company.registered,
        company_type: kind_to_pb(company.kind) as i32,
    }
}

fn parse_id(raw: &str) -> Result<CompanyId, Status> {
    raw.parse::<CompanyId>()
        .map_err(|e| Status::invalid_argument(format!("bad value: {e}")))
}

fn company_from_pb(input: pb::Company, id: CompanyId) -> Result<Company, Status> {
    let kind = kind_from_pb(input.company_type)?
        .ok_or_else(|| Status::invalid_argument("you must specify 'company_type'"))?;
    Company::new(
        id,
        input.name,
        input.description,
        input.employees_count,
        input.registered,
        kind,
        Utc::now(),
    )
    .map_err(domain_error_to_status)
}

fn require_company(company: Option<pb::Company>) -> Result<pb::Company, Status> {
    company.ok_or_else(|| Status::invalid_argument("you must specify 'company'"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Service
// ─────────────────────────────────────────────────────────────────────────────

#[tonic::async_trait]
impl CompanyService for CompanyApi {
    async fn login(
        &self,
        request: Request<pb::LoginRequest>,
    ) -> Result<Response<pb::LoginResponse>, Status> {
        let req = request.into_inner();

        let user = match self.users.get_user_by_username(&req.user).await {
            Ok(user) => user,
            Err(StoreError::NotFound) => return Err(Status::unauthenticated(INVALID_CREDENTIALS)),
            Err(err) => return Err(store_error_to_status(err)),
        };

        match verify_password(&req.password, &user.password_hash) {
            Ok(true) => {}
            Ok(false) => return Err(Status::unauthenticated(INVALID_CREDENTIALS)),
            Err(err) => {
                tracing::error!(username = %user.username, error = %err, "stored password hash is unusable");
                return Err(Status::internal("unable to verify credentials"));
            }
        }

        let jwt = self
            .validator
            .codec()
            .issue_for_user(&user, Utc::now())
            .map_err(|err| {
                tracing::error!(error = %err, "unable to sign token");
                Status::internal("unable to issue token")
            })?;

        tracing::info!(username = %user.username, id = user.id, "user logged in");
        Ok(Response::new(pb::LoginResponse { jwt }))
    }

    async fn create(
        &self,
        request: Request<pb::CreateCompanyRequest>,
    ) -> Result<Response<pb::CreateCompanyResponse>, Status> {
        self.authorize(&request, OperationKind::Create).await?;

        let input = require_company(request.into_inner().company)?;
        let id = match input.id.trim() {
            "" => CompanyId::new(),
            raw => parse_id(raw)?,
        };
        let company = company_from_pb(input, id)?;

        self.companies
            .create_company(&company)
            .await
            .map_err(store_error_to_status)?;
        tracing::debug!(company_id = %company.id, "company created");

        self.notify_company(&company, EventKind::Created).await;

        Ok(Response::new(pb::CreateCompanyResponse {
            id: company.id.to_string(),
        }))
    }

    async fn get(
        &self,
        request: Request<pb::GetCompanyRequest>,
    ) -> Result<Response<pb::GetCompanyResponse>, Status> {
        let id = parse_id(&request.into_inner().id)?;
        let company = self
            .companies
            .get_company(id)
            .await
            .map_err(store_error_to_status)?;

        Ok(Response::new(pb::GetCompanyResponse {
            company: Some(company_to_pb(&company)),
        }))
    }

    async fn update(
        &self,
        request: Request<pb::UpdateCompanyRequest>,
    ) -> Result<Response<pb::UpdateCompanyResponse>, Status> {
        self.authorize(&request, OperationKind::Update).await?;

        let input = require_company(request.into_inner().company)?;
        let id = parse_id(&input.id)?;
        let company = company_from_pb(input, id)?;

        self.companies
            .update_company(&company)
            .await
            .map_err(store_error_to_status)?;
        tracing::debug!(company_id = %company.id, "company updated");

        self.notify_company(&company, EventKind::Updated).await;

        Ok(Response::new(pb::UpdateCompanyResponse {}))
    }

    async fn delete(
        &self,
        request: Request<pb::DeleteCompanyRequest>,
    ) -> Result<Response<pb::DeleteCompanyResponse>, Status> {
        self.authorize(&request, OperationKind::Delete).await?;

        let id = parse_id(&request.into_inner().id)?;
        self.companies
            .delete_company(id)
            .await
            .map_err(store_error_to_status)?;
        tracing::debug!(company_id = %id, "company deleted");

        self.notify(OutboundEvent::new(id.to_string(), EventKind::Deleted, Vec::new()))
            .await;

        Ok(Response::new(pb::DeleteCompanyResponse {}))
    }

    async fn list(
        &self,
        request: Request<pb::ListCompaniesRequest>,
    ) -> Result<Response<pb::ListCompaniesResponse>, Status> {
        let req = request.into_inner();
        let filters = CompanyFilters {
            name: Some(req.name).filter(|n| !n.is_empty()),
            kind: kind_from_pb(req.company_type)?,
            registered: req.registered,
            limit: req.limit,
            offset: req.offset,
        };

        let companies = self
            .companies
            .list_companies(&filters)
            .await
            .map_err(store_error_to_status)?;

        Ok(Response::new(pb::ListCompaniesResponse {
            result: companies.iter().map(company_to_pb).collect(),
        }))
    }
}
