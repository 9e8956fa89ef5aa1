//! Conversions between plain unicast routes (tenant side) and labeled
//! VPN routes (core side). Nothing here does I/O or touches shared state.

use std::net::IpAddr;

use thiserror::Error;

use crate::rib::{
    ExtCommunity, Nlri, PathAttribute, PathAttributes, RouteDistinguisher, RouteTarget,
    RouteUpdate, NO_EXPORT,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TranslateError {
    #[error("unsupported prefix type for {direction}: {nlri}")]
    UnsupportedPrefixType { direction: &'static str, nlri: String },
    #[error("route {0} has no next-hop")]
    MissingNexthop(String),
    #[error("route {0} has no route-target")]
    MissingRouteTarget(String),
}

/// Route target carried in a VPN route's extended communities
pub fn route_target(update: &RouteUpdate) -> Result<RouteTarget, TranslateError> {
    update
        .route_target_community()
        .ok_or_else(|| TranslateError::MissingRouteTarget(update.nlri.to_string()))
}

/// Plain -> VPN
///
/// The prefix is wrapped with `rd` and `labels`, `rt` is added to the
/// extended communities and the route's own next-hop is carried as the
/// multiprotocol next-hop. Everything else passes through. A withdrawal
/// may come without a next-hop.
pub fn to_vpn(
    update: &RouteUpdate,
    rd: RouteDistinguisher,
    labels: &[u32],
    rt: RouteTarget,
) -> Result<RouteUpdate, TranslateError> {
    let prefix = match &update.nlri {
        Nlri::Unicast(prefix) => *prefix,
        other => {
            return Err(TranslateError::UnsupportedPrefixType {
                direction: "plain->vpn",
                nlri: other.to_string(),
            })
        }
    };
    let next_hop = match update.next_hop() {
        Some(next_hop) => Some(next_hop),
        None if update.withdraw => None,
        None => return Err(TranslateError::MissingNexthop(update.nlri.to_string())),
    };

    let target = rt.to_ext_community();
    let mut attributes: Vec<_> = next_hop
        .map(|next_hop| PathAttribute::MpReachNlri { next_hop })
        .into_iter()
        .collect();
    let mut tagged = false;
    for attr in &update.attributes {
        match attr {
            PathAttribute::NextHop(_) | PathAttribute::MpReachNlri { .. } => continue,
            PathAttribute::ExtendedCommunities(comms) => {
                let mut comms = comms.clone();
                if !comms.contains(&target) {
                    comms.push(target);
                }
                attributes.push(PathAttribute::ExtendedCommunities(comms));
                tagged = true;
            }
            attr => attributes.push(attr.clone()),
        }
    }
    if !tagged {
        attributes.push(PathAttribute::ExtendedCommunities(vec![target]));
    }

    Ok(RouteUpdate {
        nlri: Nlri::LabeledVpn {
            rd,
            labels: labels.to_vec(),
            prefix,
        },
        attributes,
        withdraw: update.withdraw,
        route_target: rt.to_string(),
        source_id: update.source_id,
    })
}

/// VPN -> Plain
///
/// Drops the RD/label wrapper and the VPN-only attributes, strips
/// NO_EXPORT and replaces the next-hop with `alias`. The real VPN
/// next-hop is kept as `source_id`. A bare withdrawal has neither.
pub fn to_plain(
    update: &RouteUpdate,
    alias: Option<IpAddr>,
) -> Result<RouteUpdate, TranslateError> {
    let prefix = match &update.nlri {
        Nlri::LabeledVpn { prefix, .. } => *prefix,
        other => {
            return Err(TranslateError::UnsupportedPrefixType {
                direction: "vpn->plain",
                nlri: other.to_string(),
            })
        }
    };
    let real_next_hop = update.attributes.next_hop();
    if real_next_hop.is_none() && !update.withdraw {
        return Err(TranslateError::MissingNexthop(update.nlri.to_string()));
    }

    let mut attributes: Vec<_> = alias.map(PathAttribute::NextHop).into_iter().collect();
    for attr in &update.attributes {
        match attr {
            PathAttribute::NextHop(_) => continue,
            attr if attr.is_multiprotocol() => continue,
            PathAttribute::ExtendedCommunities(comms) => {
                let comms: Vec<ExtCommunity> = comms
                    .iter()
                    .filter(|c| c.route_target().is_none())
                    .copied()
                    .collect();
                if !comms.is_empty() {
                    attributes.push(PathAttribute::ExtendedCommunities(comms));
                }
            }
            PathAttribute::Communities(comms) => {
                let comms: Vec<_> = comms.iter().filter(|c| **c != NO_EXPORT).copied().collect();
                if !comms.is_empty() {
                    attributes.push(PathAttribute::Communities(comms));
                }
            }
            attr => attributes.push(attr.clone()),
        }
    }

    Ok(RouteUpdate {
        nlri: Nlri::Unicast(prefix),
        attributes,
        withdraw: update.withdraw,
        route_target: update.route_target.clone(),
        source_id: real_next_hop,
    })
}
