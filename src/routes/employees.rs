use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use diesel::{prelude::*, result::DatabaseErrorKind, PgConnection};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    folders::{clean_optional, FolderBackend},
    identity::IdentityKey,
    models::{Employee, NewEmployee, EMPLOYEE_STATUS_ACTIVE, EMPLOYEE_STATUS_INACTIVE},
    pagination::{paginate, Page, PageParams},
    schema::{companies, employees},
    state::AppState,
    utils::json::FieldPatch,
};

use super::folders::{optional_body, FolderTarget, ResolveResponse};
use super::to_iso;

#[derive(Deserialize)]
pub struct EmployeeListQuery {
    pub company_id: Option<Uuid>,
    pub status: Option<String>,
    pub department: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateEmployeeRequest {
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub company_id: Option<Uuid>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Serialize)]
pub struct EmployeeSummary {
    pub id: Uuid,
    pub company_id: Option<Uuid>,
    pub email: String,
    pub name: String,
    pub department: Option<String>,
    pub position: Option<String>,
    pub phone: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Serialize)]
pub struct EmployeeFolderResponse {
    pub employee_id: Uuid,
    #[serde(flatten)]
    pub folder: ResolveResponse,
}

pub async fn list_employees(
    State(state): State<AppState>,
    Query(filter): Query<EmployeeListQuery>,
    Query(page): Query<PageParams>,
) -> AppResult<Json<Page<EmployeeSummary>>> {
    let mut conn = state.db()?;

    let mut query = employees::table.into_boxed();
    if let Some(company_id) = filter.company_id {
        query = query.filter(employees::company_id.eq(company_id));
    }
    if let Some(status) = filter.status.as_deref() {
        query = query.filter(employees::status.eq(parse_status(status)?));
    }
    if let Some(department) = filter.department.as_deref().map(str::trim) {
        if !department.is_empty() {
            query = query.filter(employees::department.eq(department.to_string()));
        }
    }

    let staff: Vec<Employee> = query
        .order((employees::name.asc(), employees::email.asc()))
        .load(&mut conn)?;

    Ok(Json(paginate(staff, page).map(build_summary)))
}

pub async fn create_employee(
    State(state): State<AppState>,
    Json(payload): Json<CreateEmployeeRequest>,
) -> AppResult<(StatusCode, Json<EmployeeSummary>)> {
    let email = IdentityKey::derive(&payload.email)
        .ok_or_else(|| AppError::bad_request("email is not a valid address"))?;
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }

    let mut conn = state.db()?;
    if let Some(company_id) = payload.company_id {
        ensure_company(&mut conn, company_id)?;
    }

    let new_employee = NewEmployee {
        id: Uuid::new_v4(),
        company_id: payload.company_id,
        email: email.into_string(),
        name: name.to_string(),
        department: clean_optional(payload.department),
        position: clean_optional(payload.position),
        phone: clean_optional(payload.phone),
        status: EMPLOYEE_STATUS_ACTIVE.to_string(),
    };

    match diesel::insert_into(employees::table)
        .values(&new_employee)
        .execute(&mut conn)
    {
        Ok(_) => {}
        Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            return Err(AppError::conflict("an employee with this email already exists"));
        }
        Err(err) => return Err(AppError::from(err)),
    }

    let employee: Employee = employees::table.find(new_employee.id).first(&mut conn)?;
    Ok((StatusCode::CREATED, Json(build_summary(employee))))
}

pub async fn get_employee(
    State(state): State<AppState>,
    Path(employee_id): Path<Uuid>,
) -> AppResult<Json<EmployeeSummary>> {
    let mut conn = state.db()?;
    let employee: Employee = employees::table.find(employee_id).first(&mut conn)?;
    Ok(Json(build_summary(employee)))
}

/// Applies a partial update. The email is the employee's identity key and
/// cannot change; deactivation is a status change, never a delete.
pub async fn update_employee(
    State(state): State<AppState>,
    Path(employee_id): Path<Uuid>,
    Json(body): Json<Value>,
) -> AppResult<Json<EmployeeSummary>> {
    if !body.is_object() {
        return Err(AppError::bad_request("expected a JSON object"));
    }
    if body.get("email").is_some() {
        return Err(AppError::bad_request("email cannot be changed"));
    }

    let mut conn = state.db()?;
    let existing: Employee = employees::table.find(employee_id).first(&mut conn)?;

    let name = match body.get("name") {
        None => existing.name.clone(),
        Some(Value::String(value)) if !value.trim().is_empty() => value.trim().to_string(),
        Some(_) => return Err(AppError::bad_request("name must be a non-empty string")),
    };
    let status = match body.get("status") {
        None => existing.status.clone(),
        Some(Value::String(value)) => parse_status(value)?.to_string(),
        Some(_) => return Err(AppError::bad_request("status must be a string")),
    };
    let company_id = match body.get("company_id") {
        None => existing.company_id,
        Some(Value::Null) => None,
        Some(Value::String(value)) => {
            let company_id = Uuid::parse_str(value)
                .map_err(|_| AppError::bad_request("company_id must be a UUID"))?;
            ensure_company(&mut conn, company_id)?;
            Some(company_id)
        }
        Some(_) => return Err(AppError::bad_request("company_id must be a UUID or null")),
    };

    let patch = |field: &str| FieldPatch::from_body(&body, field).map_err(AppError::bad_request);
    let department = patch("department")?.apply(existing.department.clone());
    let position = patch("position")?.apply(existing.position.clone());
    let phone = patch("phone")?.apply(existing.phone.clone());

    diesel::update(employees::table.find(employee_id))
        .set((
            employees::name.eq(&name),
            employees::status.eq(&status),
            employees::company_id.eq(company_id),
            employees::department.eq(&department),
            employees::position.eq(&position),
            employees::phone.eq(&phone),
            employees::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)?;

    if status != existing.status {
        info!(%employee_id, from = %existing.status, to = %status, "employee status changed");
    }

    let updated: Employee = employees::table.find(employee_id).first(&mut conn)?;
    Ok(Json(build_summary(updated)))
}

/// Finds or creates the employee's folder and syncs it with the current
/// employee record.
pub async fn resolve_employee_folder(
    State(state): State<AppState>,
    Path(employee_id): Path<Uuid>,
    body: Bytes,
) -> AppResult<Json<EmployeeFolderResponse>> {
    let target: FolderTarget = optional_body(&body)?;
    let employee: Employee = {
        let mut conn = state.db()?;
        employees::table.find(employee_id).first(&mut conn)?
    };
    if !employee.is_active() {
        return Err(AppError::conflict("employee is inactive"));
    }

    let backend: FolderBackend = target.store;
    let resolver = state.resolver(backend)?;
    let parent_scope = state.parent_scope(backend, target.parent_scope.as_deref())?;

    let resolution = resolver
        .resolve(&parent_scope, &employee.email, employee.folder_metadata())
        .await?;

    Ok(Json(EmployeeFolderResponse {
        employee_id,
        folder: ResolveResponse {
            backend,
            parent_scope,
            resolution,
        },
    }))
}

fn parse_status(value: &str) -> AppResult<&'static str> {
    match value.trim().to_ascii_lowercase().as_str() {
        EMPLOYEE_STATUS_ACTIVE => Ok(EMPLOYEE_STATUS_ACTIVE),
        EMPLOYEE_STATUS_INACTIVE => Ok(EMPLOYEE_STATUS_INACTIVE),
        _ => Err(AppError::bad_request("status must be active or inactive")),
    }
}

fn ensure_company(conn: &mut PgConnection, company_id: Uuid) -> AppResult<()> {
    let found = companies::table
        .find(company_id)
        .select(companies::id)
        .first::<Uuid>(conn)
        .optional()?;
    match found {
        Some(_) => Ok(()),
        None => Err(AppError::bad_request("company does not exist")),
    }
}

fn build_summary(employee: Employee) -> EmployeeSummary {
    EmployeeSummary {
        id: employee.id,
        company_id: employee.company_id,
        email: employee.email,
        name: employee.name,
        department: employee.department,
        position: employee.position,
        phone: employee.phone,
        status: employee.status,
        created_at: to_iso(employee.created_at),
        updated_at: to_iso(employee.updated_at),
    }
}
