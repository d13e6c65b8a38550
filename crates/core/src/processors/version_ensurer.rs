//! Gives every language a first version when it only has unversioned data.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{ItemProcessor, ItemStream};
use crate::context::LoadContext;
use crate::errors::{LoadError, ModelError};
use crate::item::field::well_known;
use crate::item::{Field, FieldData, FieldGate, Item};

/// Timestamp format used by statistics fields.
pub const STATISTICS_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Add the revision, created and updated statistics fields to one version of
/// `item`, skipping any the item already carries.
///
/// Gates: revision on create or update, created/created-by on create,
/// updated/updated-by on update. With `force` the revision and updated
/// fields are ungated so they are always written.
pub fn add_statistics_fields(
    item: &mut Item,
    language: &str,
    version: u32,
    user: &str,
    now: DateTime<Utc>,
    force: bool,
) -> Result<usize, ModelError> {
    let stamp = now.format(STATISTICS_DATE_FORMAT).to_string();
    let revision = Uuid::new_v4().to_string();
    let update_gate = |gate: FieldGate| if force { None } else { Some(gate) };

    let candidates = [
        (well_known::REVISION, "__Revision", revision.as_str(), update_gate(FieldGate::ON_CREATE_OR_UPDATE)),
        (well_known::CREATED, "__Created", stamp.as_str(), Some(FieldGate::ON_CREATE)),
        (well_known::CREATED_BY, "__Created by", user, Some(FieldGate::ON_CREATE)),
        (well_known::UPDATED, "__Updated", stamp.as_str(), update_gate(FieldGate::ON_UPDATE)),
        (well_known::UPDATED_BY, "__Updated by", user, update_gate(FieldGate::ON_UPDATE)),
    ];

    let mut added = 0;
    for (id, name, value, gate) in candidates {
        let mut data = FieldData::new(id, value).with_name(name);
        data.gate = gate;
        if item.add_field_if_missing(Field::versioned(language, version, data)?) {
            added += 1;
        }
    }
    Ok(added)
}

/// Pre-stage processor: a language that has unversioned fields but no
/// version receives version 1 with its statistics fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct ItemVersionEnsurer;

impl ItemVersionEnsurer {
    fn ensure(&self, ctx: &LoadContext, mut item: Item) -> Result<Item, ModelError> {
        let bare: Vec<String> = item
            .languages()
            .into_iter()
            .filter(|language| item.versions(language).is_empty())
            .map(str::to_string)
            .collect();

        let now = Utc::now();
        for language in bare {
            add_statistics_fields(
                &mut item,
                &language,
                1,
                ctx.user(),
                now,
                ctx.options().force_update_all_fields,
            )?;
        }
        Ok(item)
    }
}

impl ItemProcessor for ItemVersionEnsurer {
    fn process<'a>(&'a self, ctx: &'a LoadContext, items: ItemStream<'a>) -> ItemStream<'a> {
        Box::new(items.map(move |item| -> Result<Item, LoadError> {
            Ok(self.ensure(ctx, item?)?)
        }))
    }
}
