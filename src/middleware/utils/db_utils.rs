use core::fmt;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use surrealdb::engine::any::Any as SurDb;
use surrealdb::method::Query;
use surrealdb::sql::Thing;

use crate::database::client::Db;
use crate::middleware::ctx::Ctx;
use crate::middleware::error::{AppError, CtxError, CtxResult};

pub enum IdentIdName {
    Id(Thing),
    ColumnIdent {
        column: String,
        val: String,
        rec: bool,
    },
    ColumnIdentAnd(Vec<IdentIdName>),
}

impl IdentIdName {
    pub fn get_bindings_map(&self) -> HashMap<String, String> {
        let mut bindings: HashMap<String, String> = HashMap::new();
        match self {
            IdentIdName::Id(id) => {
                bindings.insert("id".to_string(), id.to_raw());
                bindings
            }
            IdentIdName::ColumnIdent { val, column, .. } => {
                bindings.insert(column.clone(), val.clone());
                bindings
            }
            IdentIdName::ColumnIdentAnd(and_filters) => {
                and_filters.iter().fold(bindings, |mut acc, filter| {
                    acc.extend(filter.get_bindings_map());
                    acc
                })
            }
        }
    }
}

impl Display for IdentIdName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentIdName::Id(_) => f.write_str("<record>$id"),
            IdentIdName::ColumnIdent { column, rec, .. } => {
                let prefix = if *rec { "<record>" } else { "" };
                f.write_str(format!("{column}={prefix}${column}").as_str())
            }
            IdentIdName::ColumnIdentAnd(and_filters) => f.write_str(
                and_filters
                    .iter()
                    .map(|f| f.to_string())
                    .collect::<Vec<_>>()
                    .join(" AND ")
                    .as_str(),
            ),
        }
    }
}

#[derive(Debug)]
pub struct QryBindingsVal<T: Serialize + 'static>(String, HashMap<String, T>);

impl<T: Serialize + 'static> QryBindingsVal<T> {
    pub fn new(qry: String, bindings: HashMap<String, T>) -> Self {
        QryBindingsVal(qry, bindings)
    }
    pub fn get_query_string(&self) -> String {
        self.0.clone()
    }
    pub fn into_query(self, db: &Db) -> Query<SurDb> {
        self.1
            .into_iter()
            .fold(db.query(self.0), |qry, n_val| qry.bind(n_val))
    }
}

pub struct Pagination {
    pub order_by: Option<String>,
    pub order_dir: Option<QryOrder>,
    pub count: i8,
    pub start: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub enum QryOrder {
    DESC,
    ASC,
}

impl fmt::Display for QryOrder {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            QryOrder::DESC => write!(f, "DESC"),
            QryOrder::ASC => write!(f, "ASC"),
        }
    }
}

pub trait ViewFieldSelector {
    // select query fields to fill the View object
    fn get_select_query_fields() -> String;
}

pub fn get_entity_query_str(
    ident: &IdentIdName,
    select_fields_or_id: Option<&str>,
    pagination: Option<Pagination>,
    table_name: String,
) -> Result<QryBindingsVal<String>, AppError> {
    let mut q_bindings: HashMap<String, String> = HashMap::new();

    let query_string = match ident {
        IdentIdName::Id(id) => {
            if id.to_raw().len() < 3 {
                return Err(AppError::Generic {
                    description: "IdentIdName::Id() value too short".to_string(),
                });
            }
            let fields = select_fields_or_id.unwrap_or("*");
            q_bindings.insert("id".to_string(), id.to_raw());

            format!("SELECT {fields} FROM <record>$id;")
        }
        _ => {
            let pagination_q = match pagination {
                None => "".to_string(),
                Some(pag) => {
                    let order_by = pag.order_by;
                    let mut pag_q = match order_by.clone() {
                        None => "".to_string(),
                        Some(order_by_f) => {
                            let dir = pag.order_dir.unwrap_or(QryOrder::DESC);
                            format!(" ORDER BY {order_by_f} {dir} ")
                        }
                    };

                    let count = if pag.count <= 0 { 20 } else { pag.count };
                    q_bindings.insert("_limit_val".to_string(), count.to_string());
                    pag_q = format!(" {pag_q} LIMIT BY type::int($_limit_val) ");

                    let start = if pag.start <= 0 { 0 } else { pag.start };
                    q_bindings.insert("_start_val".to_string(), start.to_string());
                    format!(" {pag_q} START AT type::int($_start_val) ")
                }
            };

            let fields = select_fields_or_id.unwrap_or("id");
            q_bindings.extend(ident.get_bindings_map());
            q_bindings.insert("_table".to_string(), table_name);
            format!(
                "SELECT {fields} FROM type::table($_table) WHERE {ident} {pagination_q};"
            )
        }
    };
    Ok(QryBindingsVal(query_string, q_bindings))
}

pub async fn get_entity<T: for<'a> Deserialize<'a>>(
    db: &Db,
    table_name: String,
    ident: &IdentIdName,
) -> CtxResult<Option<T>> {
    let query_string = get_entity_query_str(ident, Some("*"), None, table_name)?;
    get_query(db, query_string).await
}

pub async fn get_entity_view<T: for<'a> Deserialize<'a> + ViewFieldSelector>(
    db: &Db,
    table_name: String,
    ident: &IdentIdName,
) -> CtxResult<Option<T>> {
    let query_string = get_entity_query_str(
        ident,
        Some(T::get_select_query_fields().as_str()),
        None,
        table_name,
    )?;
    get_query(db, query_string).await
}

pub async fn get_entity_list<T: for<'a> Deserialize<'a>>(
    db: &Db,
    table_name: String,
    ident: &IdentIdName,
    pagination: Option<Pagination>,
) -> CtxResult<Vec<T>> {
    let query_string = get_entity_query_str(ident, Some("*"), pagination, table_name)?;
    get_list_query(db, query_string).await
}

pub async fn get_entity_list_view<T: for<'a> Deserialize<'a> + ViewFieldSelector>(
    db: &Db,
    table_name: String,
    ident: &IdentIdName,
    pagination: Option<Pagination>,
) -> CtxResult<Vec<T>> {
    let query_string = get_entity_query_str(
        ident,
        Some(T::get_select_query_fields().as_str()),
        pagination,
        table_name,
    )?;
    get_list_query(db, query_string).await
}

async fn get_query<T: for<'a> Deserialize<'a>>(
    db: &Db,
    query_string: QryBindingsVal<String>,
) -> Result<Option<T>, CtxError> {
    let mut res = query_string.into_query(db).await?;
    let res = res.take::<Option<T>>(0)?;
    Ok(res)
}

async fn get_list_query<T: for<'a> Deserialize<'a>>(
    db: &Db,
    query_string: QryBindingsVal<String>,
) -> Result<Vec<T>, CtxError> {
    let mut res = query_string.into_query(db).await?;
    let res = res.take::<Vec<T>>(0)?;
    Ok(res)
}

pub async fn exists_entity(db: &Db, table_name: String, ident: &IdentIdName) -> CtxResult<Option<Thing>> {
    let query_string = get_entity_query_str(ident, None, None, table_name)?;
    #[derive(Deserialize)]
    struct RecordIdView {
        id: Thing,
    }
    let rec = get_query::<RecordIdView>(db, query_string).await?;
    Ok(rec.map(|r| r.id))
}

pub fn with_not_found_err<T>(opt: Option<T>, ctx: &Ctx, ident: &str) -> CtxResult<T> {
    match opt {
        Some(res) => Ok(res),
        None => Err(ctx.to_ctx_error(AppError::EntityFailIdNotFound {
            ident: ident.to_string(),
        })),
    }
}
