use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Error, LullService, Result,
	prompt::MAX_NOTES_CHARS,
	stores::{ItemLabelState, LabelUpdate},
};

#[derive(Debug, Clone, Default)]
pub struct ConfirmLabelRequest {
	pub item_id: Uuid,
	pub owner_id: String,
	pub label: Option<String>,
	pub resolution: Option<String>,
	pub notes: Option<String>,
	pub validated: Option<bool>,
}

impl LullService {
	/// Applies a user's confirmation or correction. Provided fields become user-sourced, then the
	/// item's index metadata is refreshed.
	pub async fn confirm_label(&self, req: ConfirmLabelRequest) -> Result<ItemLabelState> {
		let update = normalize_update(&req)?;
		let not_found = || Error::NotFound {
			message: format!("item {} for owner {}", req.item_id, req.owner_id),
		};

		self.stores
			.labels
			.update_labels(req.item_id, &req.owner_id, &update, OffsetDateTime::now_utc())
			.await?
			.ok_or_else(not_found)?;

		let _guard = self.locks().lock(&req.owner_id).await;
		// Another confirmation may have landed after this write, so the flag comes from the row
		// as it reads now.
		let item = self
			.stores
			.labels
			.get_item(req.item_id)
			.await?
			.filter(|item| item.owner_id == req.owner_id)
			.ok_or_else(not_found)?;

		if let Err(err) =
			self.stores.index.set_label_present(item.item_id, item.label_present()).await
		{
			tracing::warn!(item_id = %item.item_id, error = %err, "Index label refresh failed.");
		}

		tracing::info!(
			item_id = %item.item_id,
			owner_id = %item.owner_id,
			label_present = item.label_present(),
			"Label confirmed."
		);

		Ok(item)
	}
}

fn normalize_update(req: &ConfirmLabelRequest) -> Result<LabelUpdate> {
	let required = |key: &str, value: &Option<String>| -> Result<Option<String>> {
		match value.as_deref().map(str::trim) {
			Some("") => Err(Error::validation(format!("{key} must not be blank."))),
			Some(text) => Ok(Some(text.to_string())),
			None => Ok(None),
		}
	};
	let label = required("label", &req.label)?;
	let resolution = required("resolution", &req.resolution)?;

	if let Some(notes) = &req.notes
		&& notes.chars().count() > MAX_NOTES_CHARS
	{
		return Err(Error::validation(format!(
			"notes must be at most {MAX_NOTES_CHARS} characters."
		)));
	}

	Ok(LabelUpdate { label, resolution, notes: req.notes.clone(), validated: req.validated })
}
