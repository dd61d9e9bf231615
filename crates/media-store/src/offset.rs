//! The durable watermark shared by every poll loop (projector(s) and the
//! saga engine each own a distinct row, keyed by name) — spec.md section
//! 3, "Projector offset", generalized to the saga engine's own offset
//! per spec.md section 4.3 ("Saga polling uses its own durable offset,
//! independent of any projector's").

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use media_core::{CoreError, Result};

use crate::schema::projector_offsets;

/// Used on first start, before any watermark row exists for `name`.
pub fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(0, 0).expect("unix epoch is representable")
}

pub fn read_watermark(conn: &mut PgConnection, name: &str) -> Result<DateTime<Utc>> {
    let watermark = projector_offsets::table
        .filter(projector_offsets::name.eq(name))
        .select(projector_offsets::watermark)
        .first::<DateTime<Utc>>(conn)
        .optional()
        .map_err(CoreError::from)?;
    Ok(watermark.unwrap_or_else(epoch))
}

/// Upserts the watermark for `name`. Called after each tick's batch is
/// applied, never mid-batch.
pub fn write_watermark(conn: &mut PgConnection, name: &str, watermark: DateTime<Utc>) -> Result<()> {
    diesel::insert_into(projector_offsets::table)
        .values((
            projector_offsets::name.eq(name),
            projector_offsets::watermark.eq(watermark),
            projector_offsets::updated_at.eq(Utc::now()),
        ))
        .on_conflict(projector_offsets::name)
        .do_update()
        .set((
            projector_offsets::watermark.eq(watermark),
            projector_offsets::updated_at.eq(Utc::now()),
        ))
        .execute(conn)
        .map_err(CoreError::from)?;
    Ok(())
}

/// One nanosecond past the last applied event's `created_at`, per
/// spec.md section 4.2 step 4 ("to prevent refetching the same last
/// event").
pub fn advance_past(created_at: DateTime<Utc>) -> DateTime<Utc> {
    created_at + chrono::Duration::nanoseconds(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn advance_past_adds_one_nanosecond() {
        let now = Utc::now();
        assert_eq!(advance_past(now), now + chrono::Duration::nanoseconds(1));
    }

    proptest! {
        /// Invariant 2 (spec.md section 8): the watermark a tick writes is
        /// always strictly past the `created_at` it was derived from, so a
        /// subsequent `GetSince(watermark)` never refetches that same event.
        #[test]
        fn advance_past_is_strictly_greater(seconds in 0i64..4_102_444_800, nanos in 0u32..1_000_000_000) {
            let created_at = DateTime::<Utc>::from_timestamp(seconds, nanos).unwrap();
            prop_assert!(advance_past(created_at) > created_at);
        }
    }
}
