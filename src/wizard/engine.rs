//! Pure transitions over one user's `ConversationState`. Handlers own
//! the transport; everything here is deterministic and synchronous.

use chrono::{DateTime, Utc};

use super::steps::{self, NextStep, StepId, MAX_PHOTOS, MIN_PHOTOS};
use crate::entries::{ConversationState, DeviceType, FieldId, FieldValue};
use crate::utils::verify::{self, ValidationError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    Advanced(StepId),
    ReadyForPreview,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackOutcome {
    Moved(StepId),
    AtFirstStep,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhotoReject {
    NotAtPhotoStep,
    AlbumFull,
}

/// Chooses (or re-chooses) the brand. Re-selection resets every field
/// collected after the brand-selection point, photos included, so a
/// branch switch can never leave fields of the old branch behind.
pub fn select_brand(
    state: &mut ConversationState,
    brand: &str,
    now: DateTime<Utc>,
) -> Result<StepId, ValidationError> {
    let brand = verify::short_text(brand)?;

    state.fields.clear();
    state.photos.clear();
    state.step_history.clear();
    state.pending_censored = None;

    state.device_type = Some(DeviceType::from_brand(&brand));
    state.fields.insert(FieldId::Brand, FieldValue::Text(brand));
    state.step_history.push(StepId::Brand);

    state.current_step = match steps::next_step(state.device_type, &state.fields, 0) {
        NextStep::Ask(step) => step,
        // unreachable with an empty field set, but stay total
        NextStep::Done => StepId::Photos,
    };
    state.touch(now);

    Ok(state.current_step)
}

/// Validates and records the answer for the current step, then advances.
/// On Err the state is left exactly as it was.
pub fn apply_answer(
    state: &mut ConversationState,
    raw: &str,
    now: DateTime<Utc>,
) -> Result<Applied, ValidationError> {
    let step = state.current_step;

    if step == StepId::Brand {
        return select_brand(state, raw, now).map(Applied::Advanced);
    }

    let Some(field) = step.field() else {
        // the photo step takes photos, not text
        return Err(ValidationError::TooShort { min: 1 });
    };

    let value = verify::validate_field(field, raw, state.device_type)?;

    state.fields.insert(field, value);
    state.step_history.push(step);
    state.pending_censored = None;
    state.touch(now);

    match steps::next_step(state.device_type, &state.fields, state.photos.len()) {
        NextStep::Ask(next) => {
            state.current_step = next;
            Ok(Applied::Advanced(next))
        }
        NextStep::Done => {
            // park on the photo step so back-navigation from the
            // preview stays structural
            state.current_step = StepId::Photos;
            Ok(Applied::ReadyForPreview)
        }
    }
}

/// Records one uploaded photo. The album is capped at `MAX_PHOTOS`.
pub fn add_photo(
    state: &mut ConversationState,
    file_id: String,
    now: DateTime<Utc>,
) -> Result<usize, PhotoReject> {
    if state.current_step != StepId::Photos {
        return Err(PhotoReject::NotAtPhotoStep);
    }
    if state.photos.len() >= MAX_PHOTOS {
        return Err(PhotoReject::AlbumFull);
    }

    state.photos.push(file_id);
    state.touch(now);
    Ok(state.photos.len())
}

/// Removes the most recent answer and returns to its step. Uses the
/// history stack when present, otherwise infers the previous step from
/// the branch order. A no-op at the very first step.
pub fn go_back(state: &mut ConversationState, now: DateTime<Utc>) -> BackOutcome {
    let prev = state
        .step_history
        .pop()
        .or_else(|| steps::structural_prev(state.current_step, state.device_type));

    let Some(prev) = prev else {
        return BackOutcome::AtFirstStep;
    };

    if let Some(field) = prev.field() {
        state.fields.remove(&field);
        if field == FieldId::Brand {
            state.device_type = None;
        }
    }

    state.current_step = prev;
    state.pending_censored = None;
    state.touch(now);

    BackOutcome::Moved(prev)
}

/// True once every branch field is answered and the album holds an
/// acceptable number of photos.
pub fn ready_for_preview(state: &ConversationState) -> bool {
    state.photos.len() >= MIN_PHOTOS
        && state.photos.len() <= MAX_PHOTOS
        && matches!(
            steps::next_step(state.device_type, &state.fields, state.photos.len()),
            NextStep::Done
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn answer(state: &mut ConversationState, raw: &str) -> Applied {
        apply_answer(state, raw, Utc::now()).unwrap()
    }

    fn fresh() -> ConversationState {
        ConversationState::new(Utc::now())
    }

    #[test]
    fn brand_pick_sets_device_branch() {
        let mut state = fresh();
        select_brand(&mut state, "Apple", Utc::now()).unwrap();

        assert_eq!(state.device_type, Some(DeviceType::Iphone));
        assert_eq!(state.current_step, StepId::Model);
    }

    #[test]
    fn brand_reselection_clears_branch_fields() {
        let mut state = fresh();
        select_brand(&mut state, "Apple", Utc::now()).unwrap();
        answer(&mut state, "iPhone 13");
        answer(&mut state, "128 ГБ");
        assert!(state.fields.contains_key(&FieldId::Memory));

        select_brand(&mut state, "Samsung", Utc::now()).unwrap();

        assert_eq!(state.device_type, Some(DeviceType::Android));
        assert!(!state.fields.contains_key(&FieldId::Memory));
        assert!(!state.fields.contains_key(&FieldId::Package));
        assert!(!state.fields.contains_key(&FieldId::Model));
        assert_eq!(
            state.fields.get(&FieldId::Brand),
            Some(&FieldValue::Text("Samsung".to_owned()))
        );
    }

    #[test]
    fn rejected_price_leaves_field_unset() {
        let mut state = fresh();
        select_brand(&mut state, "Apple", Utc::now()).unwrap();
        answer(&mut state, "iPhone 13");
        answer(&mut state, "128 ГБ");
        answer(&mut state, "Хорошее");
        answer(&mut state, "87");
        answer(&mut state, "Чёрный");
        answer(&mut state, "Полный комплект");
        assert_eq!(state.current_step, StepId::PriceUsd);

        let err = apply_answer(&mut state, "-5", Utc::now()).unwrap_err();
        assert_eq!(err, ValidationError::NotPositive);
        assert!(!state.fields.contains_key(&FieldId::PriceUsd));
        assert_eq!(state.current_step, StepId::PriceUsd);
    }

    #[test]
    fn full_iphone_flow_reaches_preview_with_two_photos() {
        let mut state = fresh();
        select_brand(&mut state, "Apple", Utc::now()).unwrap();

        for raw in [
            "iPhone 13",
            "128 ГБ",
            "Хорошее",
            "87",
            "Чёрный",
            "Полный комплект",
            "450",
            "39000",
            "@seller",
        ] {
            answer(&mut state, raw);
        }
        assert_eq!(state.current_step, StepId::Photos);
        assert!(!ready_for_preview(&state));

        add_photo(&mut state, "photo-1".to_owned(), Utc::now()).unwrap();
        add_photo(&mut state, "photo-2".to_owned(), Utc::now()).unwrap();

        assert!(ready_for_preview(&state));
        assert!(state.photos.len() >= 2 && state.photos.len() <= 4);
    }

    #[test]
    fn album_is_capped_at_four() {
        let mut state = fresh();
        select_brand(&mut state, "Другой", Utc::now()).unwrap();
        for raw in ["Кнопочный", "Хорошее", "Чёрный", "10", "870", "@seller"] {
            answer(&mut state, raw);
        }

        for i in 0..MAX_PHOTOS {
            add_photo(&mut state, format!("p{}", i), Utc::now()).unwrap();
        }
        assert_eq!(
            add_photo(&mut state, "p5".to_owned(), Utc::now()),
            Err(PhotoReject::AlbumFull)
        );
        assert_eq!(state.photos.len(), MAX_PHOTOS);
    }

    #[test]
    fn back_walks_to_first_step_and_stops() {
        let mut state = fresh();
        select_brand(&mut state, "Apple", Utc::now()).unwrap();
        answer(&mut state, "iPhone 13");

        assert_eq!(go_back(&mut state, Utc::now()), BackOutcome::Moved(StepId::Model));
        assert!(!state.fields.contains_key(&FieldId::Model));

        assert_eq!(go_back(&mut state, Utc::now()), BackOutcome::Moved(StepId::Brand));
        assert_eq!(state.device_type, None);
        assert!(state.fields.is_empty());

        assert_eq!(go_back(&mut state, Utc::now()), BackOutcome::AtFirstStep);
    }

    #[test]
    fn back_falls_back_to_structural_order_without_history() {
        let mut state = fresh();
        select_brand(&mut state, "Samsung", Utc::now()).unwrap();
        answer(&mut state, "Galaxy S22");
        answer(&mut state, "8 ГБ");
        state.step_history.clear();

        assert_eq!(go_back(&mut state, Utc::now()), BackOutcome::Moved(StepId::Ram));
        assert!(!state.fields.contains_key(&FieldId::Ram));
    }
}
