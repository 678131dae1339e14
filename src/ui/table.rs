use tabled::{settings::Style, Table, Tabled};
use crate::model::{Entity, ModelLink, PartLink};
use crate::storage::StoreStats;
use crate::ui::output::primary_marker;

#[derive(Tabled)]
struct EntityRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Name")]
    label: String,
}

#[derive(Tabled)]
struct PartLinkRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Part")]
    name: String,
    #[tabled(rename = "Number")]
    number: String,
    #[tabled(rename = "")]
    primary: String,
}

#[derive(Tabled)]
struct ModelLinkRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Model")]
    name: String,
    #[tabled(rename = "")]
    primary: String,
}

#[derive(Tabled)]
struct StatRow {
    #[tabled(rename = "Metric")]
    metric: &'static str,
    #[tabled(rename = "Value")]
    value: usize,
}

fn render<T: Tabled>(rows: &[T]) -> String {
    if rows.is_empty() {
        return String::new();
    }
    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn entity_table(entities: &[Entity]) -> String {
    let rows: Vec<_> = entities
        .iter()
        .map(|e| EntityRow {
            id: e.id(),
            kind: e.kind().to_string(),
            label: e.label(),
        })
        .collect();
    render(&rows)
}

pub fn part_link_table(links: &[PartLink]) -> String {
    let rows: Vec<_> = links
        .iter()
        .map(|l| PartLinkRow {
            id: l.part_id.0,
            name: l.part_name.clone(),
            number: l.part_number.clone(),
            primary: primary_marker(l.is_primary),
        })
        .collect();
    render(&rows)
}

pub fn model_link_table(links: &[ModelLink]) -> String {
    let rows: Vec<_> = links
        .iter()
        .map(|l| ModelLinkRow {
            id: l.model_id.0,
            name: l.model_name.clone(),
            primary: primary_marker(l.is_primary),
        })
        .collect();
    render(&rows)
}

pub fn stats_table(stats: &StoreStats) -> String {
    render(&[
        StatRow { metric: "Models", value: stats.models },
        StatRow { metric: "Parts", value: stats.parts },
        StatRow { metric: "Links", value: stats.links },
        StatRow { metric: "Primary links", value: stats.primary_links },
    ])
}
