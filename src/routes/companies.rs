use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use diesel::{dsl::count_star, prelude::*, result::DatabaseErrorKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    folders::clean_optional,
    models::{Company, NewCompany, EMPLOYEE_STATUS_ACTIVE},
    pagination::{paginate, Page, PageParams},
    schema::{companies, employees},
    state::AppState,
};

use super::to_iso;

#[derive(Deserialize)]
pub struct CreateCompanyRequest {
    pub name: String,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Serialize)]
pub struct CompanySummary {
    pub id: Uuid,
    pub name: String,
    pub industry: Option<String>,
    pub location: Option<String>,
    pub active_employees: i64,
    pub created_at: String,
    pub updated_at: String,
}

pub async fn list_companies(
    State(state): State<AppState>,
    Query(page): Query<PageParams>,
) -> AppResult<Json<Page<CompanySummary>>> {
    let mut conn = state.db()?;

    let company_list: Vec<Company> = companies::table
        .order(companies::name.asc())
        .load(&mut conn)?;

    let headcounts: HashMap<Uuid, i64> = employees::table
        .filter(employees::status.eq(EMPLOYEE_STATUS_ACTIVE))
        .group_by(employees::company_id)
        .select((employees::company_id, count_star()))
        .load::<(Option<Uuid>, i64)>(&mut conn)?
        .into_iter()
        .filter_map(|(company_id, count)| company_id.map(|id| (id, count)))
        .collect();

    let page = paginate(company_list, page).map(|company| {
        let active = headcounts.get(&company.id).copied().unwrap_or(0);
        build_summary(company, active)
    });
    Ok(Json(page))
}

pub async fn create_company(
    State(state): State<AppState>,
    Json(payload): Json<CreateCompanyRequest>,
) -> AppResult<(StatusCode, Json<CompanySummary>)> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }

    let new_company = NewCompany {
        id: Uuid::new_v4(),
        name: name.to_string(),
        industry: clean_optional(payload.industry),
        location: clean_optional(payload.location),
    };

    let mut conn = state.db()?;
    match diesel::insert_into(companies::table)
        .values(&new_company)
        .execute(&mut conn)
    {
        Ok(_) => {}
        Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            return Err(AppError::conflict("company name already exists"));
        }
        Err(err) => return Err(AppError::from(err)),
    }

    let company: Company = companies::table.find(new_company.id).first(&mut conn)?;
    Ok((StatusCode::CREATED, Json(build_summary(company, 0))))
}

pub async fn get_company(
    State(state): State<AppState>,
    Path(company_id): Path<Uuid>,
) -> AppResult<Json<CompanySummary>> {
    let mut conn = state.db()?;
    let company: Company = companies::table.find(company_id).first(&mut conn)?;

    let active: i64 = employees::table
        .filter(employees::company_id.eq(company_id))
        .filter(employees::status.eq(EMPLOYEE_STATUS_ACTIVE))
        .select(count_star())
        .first(&mut conn)?;

    Ok(Json(build_summary(company, active)))
}

fn build_summary(company: Company, active_employees: i64) -> CompanySummary {
    CompanySummary {
        id: company.id,
        name: company.name,
        industry: company.industry,
        location: company.location,
        active_employees,
        created_at: to_iso(company.created_at),
        updated_at: to_iso(company.updated_at),
    }
}
