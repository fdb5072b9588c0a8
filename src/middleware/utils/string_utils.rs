use surrealdb::sql::Thing;

use crate::middleware::error::{AppError, AppResult};

pub fn get_string_thing(value: String) -> AppResult<Thing> {
    Thing::try_from(value.as_str()).map_err(|_| AppError::Generic {
        description: format!("Can not parse record id from '{value}'"),
    })
}

pub fn get_str_thing(value: &str) -> AppResult<Thing> {
    Thing::try_from(value).map_err(|_| AppError::Generic {
        description: format!("Can not parse record id from '{value}'"),
    })
}
