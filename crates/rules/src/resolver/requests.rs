//! Overseerr and Jellyseerr properties.
//!
//! An item that was never requested still resolves `isRequested` (false)
//! and `amountRequested` (0); every other property stays unresolved.

use culler_core::MediaItem;

use super::{date, ValueResolver};
use crate::schema::{Application, RequestProperty, RuleValue};

pub(super) async fn resolve(
    resolver: &ValueResolver,
    app: Application,
    property: RequestProperty,
    item: &MediaItem,
) -> Option<RuleValue> {
    let info = resolver.request_info(app, item).await?;
    match property {
        RequestProperty::IsRequested => Some(RuleValue::Bool(info.is_some())),
        RequestProperty::AmountRequested => Some(RuleValue::Number(
            info.map_or(0.0, |i| f64::from(i.amount_requested)),
        )),
        _ => {
            let info = info?;
            match property {
                RequestProperty::RequestedBy => Some(RuleValue::TextList(info.requested_by)),
                RequestProperty::RequestDate => date(info.request_date),
                RequestProperty::ReleaseDate => date(info.release_date),
                RequestProperty::ApprovalDate => date(info.approval_date),
                RequestProperty::MediaAddedAt => date(info.media_added_at),
                RequestProperty::IsRequested | RequestProperty::AmountRequested => None,
            }
        }
    }
}
