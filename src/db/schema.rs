//! DDL for the fleet application tables.
//! Written once in the SQLite dialect; `init_schema` converts it per backend.

use crate::db::adapter::DbAdapter;
use crate::error::FleetDbError;
use tracing::{debug, info};

/// Tables in dependency order (referenced tables first).
/// - `id INTEGER PRIMARY KEY AUTOINCREMENT` becomes `SERIAL` on PostgreSQL
/// - `DATETIME` becomes `TIMESTAMP`
/// - statements are separated by `;`, which must not appear elsewhere
pub const FLEET_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT UNIQUE NOT NULL,
    email TEXT UNIQUE NOT NULL,
    password TEXT NOT NULL,
    nombre TEXT,
    empresa TEXT,
    role TEXT DEFAULT 'admin', -- admin | operador
    rfc TEXT,
    regimen_fiscal TEXT,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS vehicles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    numero_vehiculo TEXT NOT NULL,
    marca TEXT,
    modelo TEXT,
    año INTEGER,
    placas TEXT,
    kilometraje_actual INTEGER DEFAULT 0,
    estado TEXT DEFAULT 'Activo',
    operador_id INTEGER,
    descripcion TEXT,
    numero_serie TEXT,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE TABLE IF NOT EXISTS operators (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    nombre TEXT NOT NULL,
    licencia TEXT,
    fecha_vencimiento_licencia DATE,
    telefono TEXT,
    email TEXT,
    estado TEXT DEFAULT 'Activo',
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE TABLE IF NOT EXISTS fuel_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    vehicle_id INTEGER NOT NULL,
    fecha DATE NOT NULL,
    litros REAL NOT NULL,
    precio_litro REAL,
    costo_total REAL,
    kilometraje INTEGER,
    estacion TEXT,
    ticket_gasolina TEXT,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (vehicle_id) REFERENCES vehicles(id)
);

CREATE TABLE IF NOT EXISTS tires (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    vehicle_id INTEGER NOT NULL,
    posicion TEXT NOT NULL,
    marca TEXT,
    modelo TEXT,
    medida TEXT,
    numero_serie TEXT,
    presion_psi REAL,
    profundidad_mm REAL,
    fecha_instalacion DATE,
    kilometraje_instalacion INTEGER,
    fecha_rotacion DATE,
    kilometraje_rotacion INTEGER,
    costo REAL,
    estado TEXT DEFAULT 'Activo',
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (vehicle_id) REFERENCES vehicles(id)
);

CREATE TABLE IF NOT EXISTS tire_reviews (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tire_id INTEGER NOT NULL,
    fecha_revision DATE NOT NULL,
    presion_psi REAL,
    profundidad_mm REAL,
    kilometraje INTEGER,
    observaciones TEXT,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (tire_id) REFERENCES tires(id)
);

CREATE TABLE IF NOT EXISTS maintenance_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    vehicle_id INTEGER NOT NULL,
    tipo TEXT NOT NULL,
    fecha DATE NOT NULL,
    kilometraje INTEGER,
    descripcion TEXT,
    costo REAL,
    taller TEXT,
    proximo_mantenimiento_km INTEGER,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (vehicle_id) REFERENCES vehicles(id)
);

CREATE TABLE IF NOT EXISTS insurance_policies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    vehicle_id INTEGER NOT NULL,
    numero_poliza TEXT NOT NULL,
    compania TEXT,
    fecha_inicio DATE,
    fecha_vencimiento DATE,
    tipo_cobertura TEXT,
    costo_anual REAL,
    estado TEXT DEFAULT 'Vigente',
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (vehicle_id) REFERENCES vehicles(id)
);

CREATE TABLE IF NOT EXISTS siniestros (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    vehicle_id INTEGER NOT NULL,
    policy_id INTEGER,
    fecha_siniestro DATE NOT NULL,
    tipo_siniestro TEXT,
    descripcion TEXT,
    monto_dano REAL,
    estado TEXT DEFAULT 'En Proceso',
    numero_referencia TEXT,
    compania_seguro TEXT,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (vehicle_id) REFERENCES vehicles(id),
    FOREIGN KEY (policy_id) REFERENCES insurance_policies(id)
);

CREATE TABLE IF NOT EXISTS fines (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    vehicle_id INTEGER NOT NULL,
    fecha DATE NOT NULL,
    tipo TEXT,
    motivo TEXT NOT NULL,
    monto REAL NOT NULL,
    estado TEXT DEFAULT 'Pendiente',
    lugar TEXT,
    numero_boleta TEXT,
    fecha_vencimiento DATE,
    observaciones TEXT,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (vehicle_id) REFERENCES vehicles(id)
);

CREATE TABLE IF NOT EXISTS service_orders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    vehicle_id INTEGER,
    policy_id INTEGER,
    claim_id INTEGER,
    tipo TEXT,
    descripcion TEXT,
    fecha DATE NOT NULL,
    estado TEXT DEFAULT 'Abierta',
    total REAL,
    moneda TEXT DEFAULT 'MXN',
    notas TEXT,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    updated_at DATETIME,
    FOREIGN KEY (user_id) REFERENCES users(id),
    FOREIGN KEY (vehicle_id) REFERENCES vehicles(id),
    FOREIGN KEY (policy_id) REFERENCES insurance_policies(id),
    FOREIGN KEY (claim_id) REFERENCES siniestros(id)
);

CREATE TABLE IF NOT EXISTS invoices (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    service_order_id INTEGER,
    folio TEXT,
    serie TEXT,
    fecha DATE NOT NULL,
    cliente_nombre TEXT,
    cliente_rfc TEXT,
    subtotal REAL,
    impuestos REAL,
    total REAL,
    moneda TEXT DEFAULT 'MXN',
    estado TEXT DEFAULT 'Borrador', -- Borrador | Emitida | Cancelada
    notas TEXT,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    updated_at DATETIME,
    FOREIGN KEY (user_id) REFERENCES users(id),
    FOREIGN KEY (service_order_id) REFERENCES service_orders(id)
);

CREATE TABLE IF NOT EXISTS routes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    vehicle_id INTEGER,
    fecha_inicio DATE NOT NULL,
    hora_inicio TIME NOT NULL,
    fecha_fin DATE,
    hora_fin TIME,
    origen TEXT,
    destino TEXT,
    kilometraje_inicio INTEGER,
    kilometraje_fin INTEGER,
    estado TEXT DEFAULT 'En Curso',
    observaciones TEXT,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    updated_at DATETIME,
    FOREIGN KEY (user_id) REFERENCES users(id),
    FOREIGN KEY (vehicle_id) REFERENCES vehicles(id)
);

CREATE TABLE IF NOT EXISTS notifications_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    channel TEXT, -- email | whatsapp | sms
    tipo TEXT,
    destino TEXT,
    asunto TEXT,
    mensaje TEXT,
    scheduled_at DATETIME,
    sent_at DATETIME,
    status TEXT DEFAULT 'pending',
    error TEXT,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE TABLE IF NOT EXISTS clients (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    nombre TEXT NOT NULL,
    empresa TEXT,
    tipo TEXT,
    email TEXT,
    telefono TEXT,
    fuente TEXT,
    estado TEXT DEFAULT 'Activo',
    notas TEXT,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    updated_at DATETIME,
    FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE TABLE IF NOT EXISTS contacts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    client_id INTEGER NOT NULL,
    nombre TEXT NOT NULL,
    puesto TEXT,
    email TEXT,
    telefono TEXT,
    notas TEXT,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (user_id) REFERENCES users(id),
    FOREIGN KEY (client_id) REFERENCES clients(id)
);

CREATE TABLE IF NOT EXISTS opportunities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    client_id INTEGER,
    nombre TEXT NOT NULL,
    etapa TEXT DEFAULT 'Prospecto',
    monto REAL,
    moneda TEXT DEFAULT 'MXN',
    probabilidad INTEGER, -- 0-100
    fecha_cierre_esperada DATE,
    notas TEXT,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    updated_at DATETIME,
    FOREIGN KEY (user_id) REFERENCES users(id),
    FOREIGN KEY (client_id) REFERENCES clients(id)
);

CREATE TABLE IF NOT EXISTS activities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    client_id INTEGER,
    opportunity_id INTEGER,
    tipo TEXT,
    titulo TEXT NOT NULL,
    descripcion TEXT,
    fecha DATETIME,
    recordatorio_at DATETIME,
    estado TEXT DEFAULT 'Pendiente',
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (user_id) REFERENCES users(id),
    FOREIGN KEY (client_id) REFERENCES clients(id),
    FOREIGN KEY (opportunity_id) REFERENCES opportunities(id)
);

CREATE TABLE IF NOT EXISTS attachments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    entity_type TEXT NOT NULL,
    entity_id INTEGER NOT NULL,
    nombre_archivo TEXT NOT NULL,
    nombre_original TEXT NOT NULL,
    tipo_mime TEXT,
    tamano INTEGER, -- bytes
    ruta_archivo TEXT NOT NULL,
    descripcion TEXT,
    categoria TEXT,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE TABLE IF NOT EXISTS activity_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    entity_type TEXT NOT NULL,
    entity_id INTEGER NOT NULL,
    accion TEXT NOT NULL,
    descripcion TEXT,
    datos_anteriores TEXT, -- JSON
    datos_nuevos TEXT, -- JSON
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE TABLE IF NOT EXISTS location_tracking (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    vehicle_id INTEGER,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    accuracy REAL,
    altitude REAL,
    heading REAL,
    speed REAL,
    timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
    device_info TEXT,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (user_id) REFERENCES users(id),
    FOREIGN KEY (vehicle_id) REFERENCES vehicles(id)
);
"#;

/// Columns added after the first release: `(table, column, definition)`.
/// Older databases get them through `apply_column_additions`.
pub const COLUMN_ADDITIONS: &[(&str, &str, &str)] = &[
    ("users", "role", "TEXT DEFAULT 'admin'"),
    ("users", "rfc", "TEXT"),
    ("users", "regimen_fiscal", "TEXT"),
    ("vehicles", "descripcion", "TEXT"),
    ("vehicles", "numero_serie", "TEXT"),
    ("fuel_records", "ticket_gasolina", "TEXT"),
    ("tires", "kilometraje_rotacion", "INTEGER"),
    ("tires", "fecha_rotacion", "DATE"),
];

/// Names of the tables created by `FLEET_SCHEMA`, in creation order.
pub fn table_names() -> Vec<&'static str> {
    schema_statements()
        .filter_map(|stmt| {
            stmt.strip_prefix("CREATE TABLE IF NOT EXISTS ")
                .and_then(|rest| rest.split_whitespace().next())
        })
        .collect()
}

fn schema_statements() -> impl Iterator<Item = &'static str> {
    FLEET_SCHEMA
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Create every table that does not exist yet.
pub async fn init_schema(db: &DbAdapter) -> Result<(), FleetDbError> {
    // sqlx::query runs one statement at a time
    for stmt in schema_statements() {
        db.run_converted(stmt, ()).await?;
    }
    info!(backend = %db.backend(), tables = table_names().len(), "schema ready");
    Ok(())
}

/// Add each column in `COLUMN_ADDITIONS`, skipping those already present.
/// Returns how many columns were added.
pub async fn apply_column_additions(db: &DbAdapter) -> Result<usize, FleetDbError> {
    let mut added = 0;
    for (table, column, definition) in COLUMN_ADDITIONS {
        let sql = format!("ALTER TABLE {table} ADD COLUMN {column} {definition}");
        match db.run_converted(&sql, ()).await {
            Ok(_) => {
                info!(table, column, "added column");
                added += 1;
            }
            Err(e) if e.is_duplicate_column() => {
                debug!(table, column, "column already present");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Backend;

    #[test]
    fn schema_lists_tables_in_dependency_order() {
        let names = table_names();
        assert_eq!(names.len(), 21);
        assert_eq!(names.first(), Some(&"users"));
        let pos = |t: &str| names.iter().position(|n| *n == t).unwrap();
        assert!(pos("vehicles") < pos("fuel_records"));
        assert!(pos("tires") < pos("tire_reviews"));
        assert!(pos("insurance_policies") < pos("siniestros"));
        assert!(pos("siniestros") < pos("service_orders"));
        assert!(pos("service_orders") < pos("invoices"));
        assert!(pos("clients") < pos("opportunities"));
        assert!(pos("opportunities") < pos("activities"));
    }

    #[test]
    fn postgres_schema_has_no_sqlite_types_left() {
        for stmt in schema_statements() {
            let pg = Backend::Postgres.convert(stmt);
            assert!(!pg.contains("AUTOINCREMENT"), "{pg}");
            assert!(!pg.contains("DATETIME"), "{pg}");
            assert!(pg.contains("SERIAL PRIMARY KEY"), "{pg}");
        }
    }

    #[test]
    fn column_additions_target_known_tables() {
        let names = table_names();
        for (table, _, _) in COLUMN_ADDITIONS {
            assert!(names.contains(table), "{table}");
        }
    }
}
