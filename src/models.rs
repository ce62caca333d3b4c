use chrono::NaiveDateTime;
use diesel::prelude::*;
use uuid::Uuid;

use crate::folders::FolderMetadata;
use crate::schema::*;

pub const EMPLOYEE_STATUS_ACTIVE: &str = "active";
pub const EMPLOYEE_STATUS_INACTIVE: &str = "inactive";

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = companies)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub industry: Option<String>,
    pub location: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = companies)]
pub struct NewCompany {
    pub id: Uuid,
    pub name: String,
    pub industry: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = employees)]
#[diesel(belongs_to(Company))]
pub struct Employee {
    pub id: Uuid,
    pub company_id: Option<Uuid>,
    pub email: String,
    pub name: String,
    pub department: Option<String>,
    pub position: Option<String>,
    pub phone: Option<String>,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Employee {
    pub fn is_active(&self) -> bool {
        self.status == EMPLOYEE_STATUS_ACTIVE
    }

    /// Metadata written onto the employee's folder.
    pub fn folder_metadata(&self) -> FolderMetadata {
        FolderMetadata {
            name: self.name.clone(),
            department: self.department.clone(),
            position: self.position.clone(),
            phone: self.phone.clone(),
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = employees)]
pub struct NewEmployee {
    pub id: Uuid,
    pub company_id: Option<Uuid>,
    pub email: String,
    pub name: String,
    pub department: Option<String>,
    pub position: Option<String>,
    pub phone: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = employee_folders)]
pub struct EmployeeFolder {
    pub id: Uuid,
    pub parent_scope: String,
    pub owner_email: String,
    pub name: String,
    pub department: Option<String>,
    pub position: Option<String>,
    pub phone: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = employee_folders)]
pub struct NewEmployeeFolder {
    pub id: Uuid,
    pub parent_scope: String,
    pub owner_email: String,
    pub name: String,
    pub department: Option<String>,
    pub position: Option<String>,
    pub phone: Option<String>,
}
