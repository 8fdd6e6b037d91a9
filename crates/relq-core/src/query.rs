//! The query façade: initial columns over a base table plus a transformation
//! chain, with provenance lookups and record fetching.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::column::{InitialColumn, TableId};
use crate::error::Result;
use crate::executor::{Record, RecordExecutor};
use crate::joins::build_initial_relation;
use crate::metadata::Metadata;
use crate::sql::{RecordOptions, Relation, RelationColumn};
use crate::transform::{Transform, TransformChain, Transformation};

/// Sub-relation name prefix used when a query is not named.
pub const DEFAULT_QUERY_NAME: &str = "query";

/// An abstract query.
///
/// Relations are rebuilt on every access; a `DbQuery` is a definition, not a
/// cache. Extending the transformation list yields a new query.
#[derive(Debug, Clone)]
pub struct DbQuery {
    base_table_id: TableId,
    initial_columns: Arc<Vec<InitialColumn>>,
    transformations: TransformChain,
    name: Arc<str>,
    metadata: Metadata,
}

impl DbQuery {
    pub fn new(base_table_id: TableId, initial_columns: Vec<InitialColumn>, metadata: Metadata) -> Self {
        let mut seen = HashSet::new();
        for col in &initial_columns {
            if !seen.insert(col.alias()) {
                warn!(alias = col.alias(), "duplicate initial column alias");
            }
        }
        Self {
            base_table_id,
            initial_columns: Arc::new(initial_columns),
            transformations: TransformChain::new(),
            name: Arc::from(DEFAULT_QUERY_NAME),
            metadata,
        }
    }

    /// Prefix of every generated sub-relation name.
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Arc::from(name);
        self
    }

    /// Same query with `step` appended to its transformations.
    pub fn with_transformation(&self, step: Arc<dyn Transform>) -> Self {
        Self {
            transformations: self.transformations.clone().add_step(step),
            ..self.clone()
        }
    }

    /// Same query with its transformations replaced.
    pub fn with_transformations(&self, transformations: TransformChain) -> Self {
        Self {
            transformations,
            ..self.clone()
        }
    }

    /// Same query over another metadata handle, e.g. [`Metadata::fresh`]
    /// after the schema changed.
    pub fn with_metadata(&self, metadata: Metadata) -> Self {
        Self {
            metadata,
            ..self.clone()
        }
    }

    pub fn base_table_id(&self) -> TableId {
        self.base_table_id
    }

    pub fn initial_columns(&self) -> &[InitialColumn] {
        &self.initial_columns
    }

    pub fn transformations(&self) -> &TransformChain {
        &self.transformations
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn initial_aliases(&self) -> Vec<String> {
        self.initial_columns
            .iter()
            .map(|c| c.alias().to_string())
            .collect()
    }

    /// The relation before any transformation.
    pub fn initial_relation(&self) -> Result<Relation> {
        build_initial_relation(
            self.base_table_id,
            &self.initial_columns,
            &self.metadata,
            &self.name,
        )
    }

    /// The relation after every transformation.
    #[instrument(skip(self), fields(query = %self.name, steps = self.transformations.len()))]
    pub fn current_relation(&self) -> Result<Relation> {
        self.transformations.apply_all(self.initial_relation()?)
    }

    #[instrument(skip(self, executor, options), fields(query = %self.name))]
    pub async fn fetch_rows(
        &self,
        executor: &dyn RecordExecutor,
        options: &RecordOptions,
    ) -> Result<Vec<Record>> {
        let relation = self.current_relation()?;
        let rows = executor.select_rows(&relation, options).await?;
        debug!(rows = rows.len(), "fetched rows");
        Ok(rows)
    }

    #[instrument(skip(self, executor, options), fields(query = %self.name))]
    pub async fn fetch_count(
        &self,
        executor: &dyn RecordExecutor,
        options: &RecordOptions,
    ) -> Result<u64> {
        let relation = self.current_relation()?;
        executor.select_count(&relation, options).await
    }

    /// Aliases available to transformation `step` (0 = initial aliases).
    pub fn input_aliases_before_step(&self, step: usize) -> Vec<String> {
        self.transformations
            .input_aliases_before(&self.initial_aliases(), step)
    }

    /// The initial column `alias` uniquely derives from, as seen after `step`
    /// transformations. `None` when the alias is unknown or was produced by
    /// a step without a one-to-one source (aggregates).
    pub fn initial_column_for_output_alias(&self, step: usize, alias: &str) -> Option<&InitialColumn> {
        let initial = if step == 0 {
            alias.to_string()
        } else {
            self.transformations
                .trace_alias(&self.initial_aliases(), step, alias)?
        };
        self.initial_columns.iter().find(|c| c.alias() == initial)
    }

    /// Column descriptors of the current relation. Builds the whole relation
    /// and may reflect tables; keep it off hot paths.
    pub fn output_columns(&self) -> Result<Vec<RelationColumn>> {
        Ok(self.current_relation()?.columns().to_vec())
    }

    /// Every alias seen anywhere in the chain with its column descriptor.
    ///
    /// Rebuilds the relation once per prefix of the chain, so this is a
    /// diagnostic, not something to call per request. Later stages override
    /// earlier ones for reused aliases.
    pub fn all_columns_map(&self) -> Result<HashMap<String, RelationColumn>> {
        let initial = self.initial_relation()?;
        let mut map: HashMap<String, RelationColumn> = initial
            .columns()
            .iter()
            .map(|c| (c.name.clone(), c.clone()))
            .collect();
        for n in 1..=self.transformations.len() {
            let relation = self.transformations.prefix(n).apply_all(initial.clone())?;
            map.extend(relation.columns().iter().map(|c| (c.name.clone(), c.clone())));
        }
        Ok(map)
    }

    /// Output alias -> input alias over all transformations; later steps
    /// win on collision. Not order-aware: use
    /// [`DbQuery::initial_column_for_output_alias`] for provenance.
    pub fn output_to_input_alias_map(&self) -> HashMap<String, String> {
        self.transformations.output_to_input_alias_map()
    }

    pub fn input_alias_for_output_alias(&self, alias: &str) -> Option<String> {
        self.output_to_input_alias_map().remove(alias)
    }
}

fn default_name() -> String {
    DEFAULT_QUERY_NAME.to_string()
}

/// Serializable form of a query built from the built-in transformations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDefinition {
    pub base_table_id: TableId,
    #[serde(default = "default_name")]
    pub name: String,
    pub initial_columns: Vec<InitialColumn>,
    #[serde(default)]
    pub transformations: Vec<Transformation>,
}

impl QueryDefinition {
    pub fn from_json(input: &str) -> Result<Self> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn into_query(self, metadata: Metadata) -> DbQuery {
        let chain: TransformChain = self
            .transformations
            .into_iter()
            .map(|t| Arc::new(t) as Arc<dyn Transform>)
            .collect();
        DbQuery::new(self.base_table_id, self.initial_columns, metadata)
            .with_name(&self.name)
            .with_transformations(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::JoinEdge;
    use crate::error::RelqError;
    use crate::executor::MockRecordExecutor;
    use crate::metadata::fixtures::metadata;
    use crate::sql::AggregateFunction;
    use crate::transform::{Filter, HideColumns, Limit, Order, Summarize};
    use serde_json::json;

    fn city_edge() -> JoinEdge {
        JoinEdge::new((10, 3), (20, 1))
    }

    fn query() -> DbQuery {
        DbQuery::new(
            10,
            vec![
                InitialColumn::new(10, 1, "id_out").unwrap(),
                InitialColumn::new(10, 2, "name_out").unwrap(),
                InitialColumn::with_join_path(20, 5, "city_out", vec![city_edge()]).unwrap(),
                InitialColumn::with_join_path(20, 3, "population", vec![city_edge()]).unwrap(),
            ],
            metadata(),
        )
    }

    fn summarized() -> DbQuery {
        query()
            .with_transformation(Arc::new(Filter::default().with("population", ">", 1000)))
            .with_transformation(Arc::new(
                Summarize::default()
                    .group("city_out", "city")
                    .aggregate("id_out", "people", AggregateFunction::Count),
            ))
    }

    #[test]
    fn zero_transformations_expose_initial_aliases() -> Result<()> {
        let q = query();
        let rel = q.current_relation()?;
        assert_eq!(rel.column_names(), q.initial_aliases());
        assert_eq!(rel.name(), "query_0");
        assert_eq!(q.input_aliases_before_step(0), q.initial_aliases());
        Ok(())
    }

    #[test]
    fn end_to_end_base_table_only() -> Result<()> {
        let q = DbQuery::new(
            10,
            vec![
                InitialColumn::new(10, 1, "id_out")?,
                InitialColumn::new(10, 2, "name_out")?,
            ],
            metadata(),
        );
        let rel = q.current_relation()?;
        assert_eq!(rel.column_names(), vec!["id_out", "name_out"]);
        assert!(rel.head().unwrap().joins().is_empty());
        assert_eq!(q.input_aliases_before_step(0), vec!["id_out", "name_out"]);
        Ok(())
    }

    #[test]
    fn trace_round_trip_without_transformations() {
        let q = query();
        for col in q.initial_columns() {
            assert_eq!(q.initial_column_for_output_alias(0, col.alias()), Some(col));
        }
        assert_eq!(q.initial_column_for_output_alias(0, "ghost"), None);
    }

    #[test]
    fn trace_through_grouping_and_aggregation() {
        let q = summarized();
        let city = q.initial_column_for_output_alias(2, "city").unwrap();
        assert_eq!(city.alias(), "city_out");
        assert_eq!(city.table_id(), 20);
        assert_eq!(q.initial_column_for_output_alias(2, "people"), None);
        // before the summarize step the aggregate input is still traceable
        assert_eq!(
            q.initial_column_for_output_alias(1, "id_out").map(|c| c.alias()),
            Some("id_out")
        );
    }

    #[test]
    fn input_aliases_per_step() {
        let q = summarized().with_transformation(Arc::new(HideColumns::new(["people"])));
        assert_eq!(q.input_aliases_before_step(1), q.initial_aliases());
        assert_eq!(q.input_aliases_before_step(2), vec!["city", "people"]);
        assert_eq!(q.input_aliases_before_step(3), vec!["city"]);
        // past the end of the chain
        assert_eq!(q.input_aliases_before_step(4), vec!["city"]);
    }

    #[test]
    fn extending_returns_a_new_query() {
        let base = query();
        let longer = base.with_transformation(Arc::new(Limit { count: 3 }));
        assert!(base.transformations().is_empty());
        assert_eq!(longer.transformations().len(), 1);
        assert_eq!(longer.initial_columns(), base.initial_columns());
    }

    #[test]
    fn named_query_prefixes_sub_relations() -> Result<()> {
        let rel = summarized().with_name("people_by_city").current_relation()?;
        assert_eq!(rel.name(), "people_by_city_2");
        let names: Vec<_> = rel.ctes().iter().map(|c| c.name.to_string()).collect();
        assert_eq!(names, vec!["people_by_city_0", "people_by_city_1", "people_by_city_2"]);
        Ok(())
    }

    #[test]
    fn alias_maps() {
        let q = summarized();
        let map = q.output_to_input_alias_map();
        assert_eq!(map.get("city").map(String::as_str), Some("city_out"));
        assert_eq!(q.input_alias_for_output_alias("people").as_deref(), Some("id_out"));
        assert_eq!(q.input_alias_for_output_alias("name_out"), None);
    }

    #[test]
    fn column_maps() -> Result<()> {
        let q = summarized();
        let out: Vec<_> = q.output_columns()?.into_iter().map(|c| c.name).collect();
        assert_eq!(out, vec!["city", "people"]);

        let all = q.all_columns_map()?;
        for alias in ["id_out", "name_out", "city_out", "population", "city", "people"] {
            assert!(all.contains_key(alias), "missing {alias}");
        }
        assert_eq!(all["people"].data_type, "bigint");
        assert!(all["city_out"].nullable);
        Ok(())
    }

    #[test]
    fn unknown_alias_in_a_step_fails_with_its_index() {
        let q = query()
            .with_transformation(Arc::new(Limit { count: 1 }))
            .with_transformation(Arc::new(Order::default().by("ghost", true)));
        assert!(matches!(
            q.current_relation(),
            Err(RelqError::UnknownAlias { step: 1, .. })
        ));
    }

    #[test]
    fn definition_round_trip_into_query() -> Result<()> {
        let def = QueryDefinition::from_json(
            &json!({
                "base_table_id": 10,
                "initial_columns": [
                    {"table_id": 10, "attnum": 1, "alias": "id_out"},
                    {"table_id": 20, "attnum": 5, "alias": "city_out", "join_path": [[[10, 3], [20, 1]]]}
                ],
                "transformations": [{"type": "limit", "spec": {"count": 2}}]
            })
            .to_string(),
        )?;
        assert_eq!(def.name, DEFAULT_QUERY_NAME);
        let q = def.into_query(metadata());
        assert_eq!(q.transformations().len(), 1);
        assert_eq!(q.current_relation()?.name(), "query_1");
        Ok(())
    }

    #[test]
    fn definition_rejects_blank_alias() {
        let res = QueryDefinition::from_json(
            r#"{"base_table_id": 10, "initial_columns": [{"table_id": 10, "attnum": 1, "alias": " "}]}"#,
        );
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn fetch_rows_runs_the_current_relation() -> Result<()> {
        let q = summarized();
        let expected = q.current_relation()?;
        let mut row = Record::new();
        row.insert("city".into(), json!("Lyon"));
        row.insert("people".into(), json!(3));

        let mut executor = MockRecordExecutor::new();
        executor
            .expect_select_rows()
            .withf(move |rel, opts| rel == &expected && opts.limit == Some(10))
            .times(1)
            .returning(move |_, _| Ok(vec![row.clone()]));

        let rows = q
            .fetch_rows(&executor, &RecordOptions::default().with_limit(10))
            .await?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["city"], json!("Lyon"));
        Ok(())
    }

    #[tokio::test]
    async fn fetch_count_delegates_and_propagates_errors() {
        let mut executor = MockRecordExecutor::new();
        executor
            .expect_select_count()
            .times(1)
            .returning(|_, _| Ok(42));
        let count = query()
            .fetch_count(&executor, &RecordOptions::default())
            .await
            .unwrap();
        assert_eq!(count, 42);

        let mut failing = MockRecordExecutor::new();
        failing
            .expect_select_count()
            .returning(|_, _| Err(RelqError::Database("connection reset".into())));
        assert!(matches!(
            query().fetch_count(&failing, &RecordOptions::default()).await,
            Err(RelqError::Database(_))
        ));
    }

    #[tokio::test]
    async fn build_errors_skip_the_executor() {
        let executor = MockRecordExecutor::new();
        let q = DbQuery::new(10, vec![InitialColumn::new(10, 99, "ghost").unwrap()], metadata());
        assert!(matches!(
            q.fetch_rows(&executor, &RecordOptions::default()).await,
            Err(RelqError::ColumnNotFound { .. })
        ));
    }
}
