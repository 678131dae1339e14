//! Database schema definitions

/// SQL to create the models table
pub const CREATE_MODELS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS car_models (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
)
"#;

/// SQL to create the parts table
pub const CREATE_PARTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS car_parts (
    id INTEGER PRIMARY KEY,
    part_number TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL
)
"#;

/// SQL to create the link table
/// At most one row per (car_id, part_id); primary-ness is a flag on the row
pub const CREATE_LINKS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS car_part_models (
    car_id INTEGER NOT NULL,
    part_id INTEGER NOT NULL,
    is_primary INTEGER NOT NULL DEFAULT 0,
    UNIQUE(car_id, part_id)
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_models_name ON car_models(name)",
    "CREATE INDEX IF NOT EXISTS idx_parts_number ON car_parts(part_number)",
    "CREATE INDEX IF NOT EXISTS idx_links_car ON car_part_models(car_id)",
    "CREATE INDEX IF NOT EXISTS idx_links_part ON car_part_models(part_id)",
];

/// Tables a snapshot must contain, with the columns the catalog reads
pub const REQUIRED_COLUMNS: &[(&str, &[&str])] = &[
    ("car_models", &["id", "name"]),
    ("car_parts", &["id", "part_number", "name"]),
    ("car_part_models", &["car_id", "part_id", "is_primary"]),
];

/// Column sets a snapshot must declare unique, per table
pub const REQUIRED_UNIQUE_KEYS: &[(&str, &[&str])] = &[
    ("car_models", &["name"]),
    ("car_parts", &["part_number"]),
    ("car_part_models", &["car_id", "part_id"]),
];

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![
        CREATE_MODELS_TABLE,
        CREATE_PARTS_TABLE,
        CREATE_LINKS_TABLE,
    ];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}
