pub const SCHEMA: &str = r#"
-- Profiles: named workspaces mapping logical roles to folder paths
CREATE TABLE IF NOT EXISTS profiles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

-- Role -> path mapping, unique per profile
CREATE TABLE IF NOT EXISTS profile_roles (
    profile_id INTEGER NOT NULL,
    role TEXT NOT NULL,          -- 'target', 'control', 'archive', ...
    path TEXT NOT NULL,
    PRIMARY KEY (profile_id, role),
    FOREIGN KEY (profile_id) REFERENCES profiles(id) ON DELETE CASCADE
);

-- Folder identities: stable idNNN_ numbers per (profile, folder_path).
-- Rows are kept with removed_at set when a folder disappears so numbers
-- are never reused.
CREATE TABLE IF NOT EXISTS folder_identities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    profile_id INTEGER NOT NULL,
    folder_path TEXT NOT NULL,
    id_number INTEGER NOT NULL,
    removed_at TEXT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (profile_id, folder_path),
    UNIQUE (profile_id, id_number),
    FOREIGN KEY (profile_id) REFERENCES profiles(id) ON DELETE CASCADE
);

-- Items: stable identity per logical file, independent of its current path.
-- item_key is derived from the folder identifier plus the relative filename
-- at first sighting and is never reassigned.
CREATE TABLE IF NOT EXISTS items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    profile_id INTEGER NOT NULL,
    item_key TEXT NOT NULL,
    current_path TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (profile_id, item_key),
    FOREIGN KEY (profile_id) REFERENCES profiles(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_items_path ON items(current_path);

-- Per-item tags with an optional value
CREATE TABLE IF NOT EXISTS item_tags (
    item_id INTEGER NOT NULL,
    tag TEXT NOT NULL,
    value TEXT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (item_id, tag),
    FOREIGN KEY (item_id) REFERENCES items(id) ON DELETE CASCADE
);

-- Categories: named buckets scoped to a profile
CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    profile_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (profile_id, name),
    FOREIGN KEY (profile_id) REFERENCES profiles(id) ON DELETE CASCADE
);

-- One category per item; reassignment overwrites
CREATE TABLE IF NOT EXISTS item_categories (
    item_id INTEGER PRIMARY KEY,
    category_id INTEGER NOT NULL,
    assigned_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (item_id) REFERENCES items(id) ON DELETE CASCADE,
    FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE CASCADE
);

-- Pairings: symmetric matched-pair relation; an item has at most one
-- active pairing. Unlinking deactivates rather than deletes.
CREATE TABLE IF NOT EXISTS pairings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    item_a INTEGER NOT NULL,
    item_b INTEGER NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    unlinked_at TEXT,
    FOREIGN KEY (item_a) REFERENCES items(id),
    FOREIGN KEY (item_b) REFERENCES items(id)
);

CREATE INDEX IF NOT EXISTS idx_pairings_a ON pairings(item_a);
CREATE INDEX IF NOT EXISTS idx_pairings_b ON pairings(item_b);

-- Staging ledger: declarative, append-only proposals. No filesystem
-- mutation happens at staging time.
CREATE TABLE IF NOT EXISTS staged_operations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    profile_id INTEGER NOT NULL,
    batch_id TEXT NOT NULL,
    sequence_no INTEGER NOT NULL,
    op_kind TEXT NOT NULL,          -- 'move', 'copy', 'rename', 'delete', 'categorize', 'tag'
    source_path TEXT NOT NULL,
    dest_path TEXT,                 -- NULL for delete/categorize/tag
    payload TEXT,                   -- JSON parameters for categorize/tag
    status TEXT NOT NULL DEFAULT 'pending',  -- 'pending', 'committed', 'failed', 'reverted'
    error TEXT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (batch_id, sequence_no),
    FOREIGN KEY (profile_id) REFERENCES profiles(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_staged_batch ON staged_operations(batch_id, sequence_no);
CREATE INDEX IF NOT EXISTS idx_staged_status ON staged_operations(status);

-- Processed log: forward-only audit trail of executed operations.
-- Undo appends inverse entries (inverse_of set) and flips reverted on the
-- forward entry; nothing is ever deleted.
CREATE TABLE IF NOT EXISTS processed_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    batch_id TEXT NOT NULL,
    sequence_no INTEGER NOT NULL,
    op_kind TEXT NOT NULL,
    source_path TEXT NOT NULL,
    dest_path TEXT,
    detail TEXT,                    -- JSON snapshot for metadata ops (prior tag/category)
    inverse_of INTEGER,             -- NULL for forward entries
    reverted INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (inverse_of) REFERENCES processed_log(id)
);

CREATE INDEX IF NOT EXISTS idx_processed_batch ON processed_log(batch_id, sequence_no);
"#;

/// Idempotent migrations for databases created by earlier builds.
/// Each statement is allowed to fail (column already present).
pub const MIGRATIONS: &[&str] = &[
    "ALTER TABLE staged_operations ADD COLUMN payload TEXT",
    "ALTER TABLE processed_log ADD COLUMN detail TEXT",
];
