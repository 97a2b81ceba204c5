//! Diesel table definitions for the PostgreSQL schema.
//!
//! These definitions must match `backend/migrations` exactly.

diesel::table! {
    /// Backing document collections mirrored by the reactive caches.
    documents (collection, id) {
        /// Collection name, for example `organizations`.
        collection -> Varchar,
        /// Document identifier, unique per collection.
        id -> Varchar,
        /// Full document as stored by the northbound API.
        body -> Jsonb,
        /// Last write time.
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Device communication history.
    communication_log (id) {
        id -> Int8,
        device_id -> Varchar,
        kind -> Varchar,
        summary -> Text,
        created_at -> Timestamptz,
        /// Purge horizon; rows past it may be deleted.
        expires_at -> Timestamptz,
    }
}
