//! Administrative bulk operations: employee import and folder provisioning.
//!
//! Imports run inside one database transaction; a dry run executes the same
//! statements and then rolls back. Provisioning walks a company's active
//! employees one at a time and records a per-employee outcome instead of
//! stopping at the first failure.

use std::collections::HashSet;

use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::folders::{clean_optional, FolderBackend, FolderResolver, Plan, Resolution};
use crate::identity::IdentityKey;
use crate::models::{Company, Employee, NewEmployee, EMPLOYEE_STATUS_ACTIVE};
use crate::schema::{companies, employees};

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("company {0} not found")]
    CompanyNotFound(Uuid),
    #[error("import contains no employees")]
    EmptyImport,
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

pub type AdminResult<T> = Result<T, AdminError>;

#[derive(Debug, Clone, Deserialize)]
pub struct EmployeeImportRow {
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportRequest {
    #[serde(default)]
    pub company_id: Option<Uuid>,
    #[serde(default)]
    pub dry_run: bool,
    pub employees: Vec<EmployeeImportRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedRow {
    pub index: usize,
    pub email: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub dry_run: bool,
    pub created: usize,
    pub updated: usize,
    pub skipped: Vec<SkippedRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProvisionFailure {
    pub employee_id: Uuid,
    pub email: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProvisionReport {
    pub company_id: Uuid,
    pub backend: FolderBackend,
    pub parent_scope: String,
    pub dry_run: bool,
    pub total: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: Vec<String>,
    pub failed: Vec<ProvisionFailure>,
}

/// Ends the import transaction. `DryRun` carries the report out of a
/// rollback.
enum ImportAbort {
    DryRun(ImportReport),
    Failed(AdminError),
}

impl From<diesel::result::Error> for ImportAbort {
    fn from(value: diesel::result::Error) -> Self {
        ImportAbort::Failed(AdminError::Database(value))
    }
}

/// Upserts employees by identity key. Existing rows keep their status; new
/// rows start active. Rows with an unusable email, an empty name, or an email
/// already seen earlier in the same request are skipped and reported.
pub fn import_employees(
    conn: &mut PgConnection,
    request: &ImportRequest,
) -> AdminResult<ImportReport> {
    if request.employees.is_empty() {
        return Err(AdminError::EmptyImport);
    }

    let outcome = conn.transaction::<ImportReport, ImportAbort, _>(|conn| {
        if let Some(company_id) = request.company_id {
            ensure_company(conn, company_id).map_err(ImportAbort::Failed)?;
        }

        let mut report = ImportReport {
            dry_run: request.dry_run,
            ..Default::default()
        };
        let mut seen = HashSet::new();
        let now = Utc::now().naive_utc();

        for (index, row) in request.employees.iter().enumerate() {
            let skip = |reason: &str| SkippedRow {
                index,
                email: row.email.clone(),
                reason: reason.to_string(),
            };

            let Some(key) = IdentityKey::derive(&row.email) else {
                report.skipped.push(skip("invalid email"));
                continue;
            };
            if !seen.insert(key.as_str().to_string()) {
                report.skipped.push(skip("duplicate email in import"));
                continue;
            }
            let name = row.name.trim();
            if name.is_empty() {
                report.skipped.push(skip("name must not be empty"));
                continue;
            }

            let department = clean(&row.department);
            let position = clean(&row.position);
            let phone = clean(&row.phone);

            let existing = employees::table
                .filter(employees::email.eq(key.as_str()))
                .first::<Employee>(conn)
                .optional()?;

            match existing {
                Some(employee) => {
                    diesel::update(employees::table.find(employee.id))
                        .set((
                            employees::name.eq(name),
                            employees::department.eq(department),
                            employees::position.eq(position),
                            employees::phone.eq(phone),
                            employees::company_id.eq(request.company_id.or(employee.company_id)),
                            employees::updated_at.eq(now),
                        ))
                        .execute(conn)?;
                    report.updated += 1;
                }
                None => {
                    let new_employee = NewEmployee {
                        id: Uuid::new_v4(),
                        company_id: request.company_id,
                        email: key.into_string(),
                        name: name.to_string(),
                        department,
                        position,
                        phone,
                        status: EMPLOYEE_STATUS_ACTIVE.to_string(),
                    };
                    diesel::insert_into(employees::table)
                        .values(&new_employee)
                        .execute(conn)?;
                    report.created += 1;
                }
            }
        }

        if request.dry_run {
            return Err(ImportAbort::DryRun(report));
        }
        Ok(report)
    });

    let report = match outcome {
        Ok(report) | Err(ImportAbort::DryRun(report)) => report,
        Err(ImportAbort::Failed(err)) => return Err(err),
    };

    info!(
        dry_run = report.dry_run,
        created = report.created,
        updated = report.updated,
        skipped = report.skipped.len(),
        "employee import finished"
    );
    Ok(report)
}

/// Loads the company and its active employees ordered by email.
pub fn load_active_employees(
    conn: &mut PgConnection,
    company_id: Uuid,
) -> AdminResult<(Company, Vec<Employee>)> {
    let company = ensure_company(conn, company_id)?;
    let staff = employees::table
        .filter(employees::company_id.eq(company_id))
        .filter(employees::status.eq(EMPLOYEE_STATUS_ACTIVE))
        .order(employees::email.asc())
        .load::<Employee>(conn)?;
    Ok((company, staff))
}

/// Resolves a folder for each employee in turn. A dry run only probes.
pub async fn provision_folders(
    resolver: &FolderResolver,
    company_id: Uuid,
    parent_scope: &str,
    staff: &[Employee],
    dry_run: bool,
) -> ProvisionReport {
    let mut report = ProvisionReport {
        company_id,
        backend: resolver.backend(),
        parent_scope: parent_scope.to_string(),
        dry_run,
        total: staff.len(),
        created: 0,
        updated: 0,
        skipped: Vec::new(),
        failed: Vec::new(),
    };

    info!(
        %company_id,
        backend = %report.backend,
        parent_scope,
        dry_run,
        employees = staff.len(),
        "provisioning employee folders"
    );

    for employee in staff {
        let outcome = if dry_run {
            resolver
                .plan(parent_scope, &employee.email)
                .await
                .map(|plan| match plan {
                    Plan::Create { .. } => Step::Created,
                    Plan::Update { .. } => Step::Updated,
                    Plan::Skip { .. } => Step::Skipped,
                })
        } else {
            resolver
                .resolve(parent_scope, &employee.email, employee.folder_metadata())
                .await
                .map(|resolution| match resolution {
                    Resolution::Resolved { created: true, .. } => Step::Created,
                    Resolution::Resolved { created: false, .. } => Step::Updated,
                    Resolution::Skipped { .. } => Step::Skipped,
                })
        };

        match outcome {
            Ok(Step::Created) => report.created += 1,
            Ok(Step::Updated) => report.updated += 1,
            Ok(Step::Skipped) => report.skipped.push(employee.email.clone()),
            Err(err) => {
                warn!(employee_id = %employee.id, error = %err, "employee folder not provisioned");
                report.failed.push(ProvisionFailure {
                    employee_id: employee.id,
                    email: employee.email.clone(),
                    error: err.to_string(),
                });
            }
        }
    }

    info!(
        %company_id,
        created = report.created,
        updated = report.updated,
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "provisioning finished"
    );
    report
}

enum Step {
    Created,
    Updated,
    Skipped,
}

fn ensure_company(conn: &mut PgConnection, company_id: Uuid) -> AdminResult<Company> {
    companies::table
        .find(company_id)
        .first::<Company>(conn)
        .optional()?
        .ok_or(AdminError::CompanyNotFound(company_id))
}

fn clean(value: &Option<String>) -> Option<String> {
    clean_optional(value.clone())
}
