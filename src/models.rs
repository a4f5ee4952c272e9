use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Teacher {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    /// PHC-format password hash. Never serialized into responses.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Course {
    pub id: Uuid,
    pub title: String,
    pub education: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub ects: f64,
    pub semester: String,
    pub description: String,
    pub responsible_teacher: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Lesson {
    pub id: Uuid,
    pub course_id: Uuid,
    pub date: NaiveDate,
    pub time: String,
    pub title: String,
    pub content: String,
    pub responsible_teacher: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignupInput {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CourseInput {
    pub title: String,
    pub education: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub ects: f64,
    pub semester: String,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LessonInput {
    pub date: NaiveDate,
    pub time: String,
    pub title: String,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn teacher_serialization_omits_the_password_hash() {
        let teacher = Teacher {
            id: Uuid::new_v4(),
            name: "Hanne Jensen".to_string(),
            email: "hanne@school.dk".to_string(),
            password_hash: "$pbkdf2-sha256$...".to_string(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&teacher).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["email"], "hanne@school.dk");
    }
}
