// Diesel table definitions for the four subsystems' tables. Each
// subsystem owns its own tables (spec.md section 6, "Persisted state
// layout"): `events` belongs to the log; `sagas`/`saga_steps`/
// `saga_aggregate_index` belong to the saga engine; `projector_offsets`
// is shared (one row per projector/engine offset owner); `media_read_model`
// belongs to the media projector.

diesel::table! {
    use diesel::sql_types::*;

    events (id) {
        id -> Uuid,
        aggregate_id -> Varchar,
        aggregate_type -> Varchar,
        event_type -> Varchar,
        data -> Jsonb,
        version -> Int8,
        checksum -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    use diesel::sql_types::*;

    projector_offsets (name) {
        name -> Varchar,
        watermark -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    use diesel::sql_types::*;

    media_read_model (aggregate_id) {
        aggregate_id -> Varchar,
        status -> Varchar,
        user_id -> Nullable<Varchar>,
        filename -> Nullable<Varchar>,
        content_type -> Nullable<Varchar>,
        size -> Nullable<Int8>,
        storage_path -> Nullable<Varchar>,
        thumbnail_path -> Nullable<Varchar>,
        width -> Nullable<Int4>,
        height -> Nullable<Int4>,
        duration -> Nullable<Float8>,
        last_event_version -> Int8,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    use diesel::sql_types::*;

    sagas (id) {
        id -> Uuid,
        saga_type -> Varchar,
        current_step -> Varchar,
        status -> Varchar,
        payload -> Jsonb,
        started_at -> Timestamptz,
        updated_at -> Timestamptz,
        completed_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    use diesel::sql_types::*;

    saga_steps (id) {
        id -> Uuid,
        saga_id -> Uuid,
        step_name -> Varchar,
        status -> Varchar,
        result -> Nullable<Jsonb>,
        retry_count -> Int4,
        last_error -> Nullable<Text>,
        started_at -> Timestamptz,
        updated_at -> Timestamptz,
        completed_at -> Nullable<Timestamptz>,
    }
}

// Resolves spec.md section 9's "Aggregate-to-saga lookup" design note:
// an index maintained by the engine on saga creation, consulted before
// falling back to a linear scan of active sagas.
diesel::table! {
    use diesel::sql_types::*;

    saga_aggregate_index (aggregate_id) {
        aggregate_id -> Varchar,
        saga_id -> Uuid,
    }
}

diesel::joinable!(saga_steps -> sagas (saga_id));
diesel::allow_tables_to_appear_in_same_query!(sagas, saga_steps, saga_aggregate_index);
