//! JSON shapes of the REST surface.
//!
//! Field names are lowerCamelCase and every field is always emitted, default
//! values included. Enums travel as their protobuf names.

use serde::{Deserialize, Serialize};

use crate::app::errors;
use crate::pb;

// -------------------------
// Companies
// -------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompanyDto {
    pub id: String,
    pub name: String,
    pub description: String,
    pub employees_count: u32,
    pub registered: bool,
    pub company_type: String,
}

impl From<pb::Company> for CompanyDto {
    fn from(c: pb::Company) -> Self {
        Self {
            id: c.id,
            name: c.name,
            description: c.description,
            employees_count: c.employees_count,
            registered: c.registered,
            company_type: type_name(c.company_type).to_string(),
        }
    }
}

impl CompanyDto {
    pub fn into_pb(self) -> Result<pb::Company, axum::response::Response> {
        Ok(pb::Company {
            company_type: parse_type(&self.company_type)?,
            id: self.id,
            name: self.name,
            description: self.description,
            employees_count: self.employees_count,
            registered: self.registered,
        })
    }
}

/// Protobuf name of a wire enum value; unknown numbers read as unspecified.
pub fn type_name(value: i32) -> &'static str {
    pb::CompanyType::try_from(value)
        .unwrap_or(pb::CompanyType::Unspecified)
        .as_str_name()
}

/// Empty selects `COMPANY_TYPE_UNSPECIFIED`.
pub fn parse_type(name: &str) -> Result<i32, axum::response::Response> {
    if name.is_empty() {
        return Ok(pb::CompanyType::Unspecified as i32);
    }
    pb::CompanyType::from_str_name(name)
        .map(|t| t as i32)
        .ok_or_else(|| errors::bad_request(format!("unknown companyType: {name}")))
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompanyBody {
    pub company: CompanyDto,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CreateCompanyResponse {
    pub id: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ListCompaniesResponse {
    pub result: Vec<CompanyDto>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListQuery {
    pub name: String,
    pub company_type: String,
    pub registered: Option<bool>,
    pub limit: u32,
    pub offset: u32,
}

impl ListQuery {
    pub fn into_pb(self) -> Result<pb::ListCompaniesRequest, axum::response::Response> {
        Ok(pb::ListCompaniesRequest {
            company_type: parse_type(&self.company_type)?,
            name: self.name,
            registered: self.registered,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

// -------------------------
// Login
// -------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub user: String,
    pub password: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LoginResponse {
    pub jwt: String,
}

/// Body of RPCs without a payload.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Empty {}
