//! Update merge engine.
//!
//! Every update path (custom app, one-click service, scale, stop) funnels through
//! [`merge`], which applies [`MERGE_POLICY`] field by field:
//!
//! - scalars are replaced when the update carries a value, kept otherwise;
//! - collections are merged by key, so entries absent from the update survive;
//! - credentials are replaced wholesale.
//!
//! Removal is only possible through [`prune`].

use crate::domain::{AppRemoval, AppState, AppUpdate, Volume, VolumeSource};

/// How a field of [`AppState`] absorbs a partial update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    ReplaceIfPresent,
    AdditiveByKey,
}

/// Mutable fields of an app's configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppField {
    InstanceCount,
    ExposeAsWebApp,
    ForceSsl,
    WebsocketSupport,
    ContainerHttpPort,
    Description,
    Command,
    HttpAuth,
    EnvVars,
    Volumes,
    Ports,
}

pub const MERGE_POLICY: [(AppField, MergePolicy); 11] = [
    (AppField::InstanceCount, MergePolicy::ReplaceIfPresent),
    (AppField::ExposeAsWebApp, MergePolicy::ReplaceIfPresent),
    (AppField::ForceSsl, MergePolicy::ReplaceIfPresent),
    (AppField::WebsocketSupport, MergePolicy::ReplaceIfPresent),
    (AppField::ContainerHttpPort, MergePolicy::ReplaceIfPresent),
    (AppField::Description, MergePolicy::ReplaceIfPresent),
    (AppField::Command, MergePolicy::ReplaceIfPresent),
    (AppField::HttpAuth, MergePolicy::ReplaceIfPresent),
    (AppField::EnvVars, MergePolicy::AdditiveByKey),
    (AppField::Volumes, MergePolicy::AdditiveByKey),
    (AppField::Ports, MergePolicy::AdditiveByKey),
];

impl AppField {
    pub fn policy(self) -> MergePolicy {
        MERGE_POLICY
            .iter()
            .find(|(field, _)| *field == self)
            .map(|(_, policy)| *policy)
            .unwrap_or(MergePolicy::ReplaceIfPresent)
    }

    fn apply(self, next: &mut AppState, update: &AppUpdate) {
        match self {
            AppField::InstanceCount => replace_if_present(&mut next.instance_count, &update.instance_count),
            AppField::ExposeAsWebApp => {
                replace_if_present(&mut next.expose_as_web_app, &update.expose_as_web_app)
            }
            AppField::ForceSsl => replace_if_present(&mut next.force_ssl, &update.force_ssl),
            AppField::WebsocketSupport => {
                replace_if_present(&mut next.websocket_support, &update.websocket_support)
            }
            AppField::ContainerHttpPort => {
                replace_if_present(&mut next.container_http_port, &update.container_http_port)
            }
            AppField::Description => replace_if_present(&mut next.description, &update.description),
            AppField::Command => {
                if update.command.is_some() {
                    next.command = update.command.clone();
                }
            }
            AppField::HttpAuth => {
                if update.http_auth.is_some() {
                    next.http_auth = update.http_auth.clone();
                }
            }
            AppField::EnvVars => merge_by_key(&mut next.env_vars, &update.env_vars, |var| &var.key),
            AppField::Volumes => merge_volumes(&mut next.volumes, &update.volumes),
            AppField::Ports => merge_by_key(&mut next.ports, &update.ports, |port| &port.host_port),
        }
    }

    fn stack(self, next: &mut AppUpdate, top: &AppUpdate) {
        match self {
            AppField::InstanceCount => or_replace(&mut next.instance_count, &top.instance_count),
            AppField::ExposeAsWebApp => or_replace(&mut next.expose_as_web_app, &top.expose_as_web_app),
            AppField::ForceSsl => or_replace(&mut next.force_ssl, &top.force_ssl),
            AppField::WebsocketSupport => {
                or_replace(&mut next.websocket_support, &top.websocket_support)
            }
            AppField::ContainerHttpPort => {
                or_replace(&mut next.container_http_port, &top.container_http_port)
            }
            AppField::Description => or_replace(&mut next.description, &top.description),
            AppField::Command => or_replace(&mut next.command, &top.command),
            AppField::HttpAuth => or_replace(&mut next.http_auth, &top.http_auth),
            AppField::EnvVars => merge_by_key(&mut next.env_vars, &top.env_vars, |var| &var.key),
            AppField::Volumes => {
                merge_by_key(&mut next.volumes, &top.volumes, |volume| &volume.container_path)
            }
            AppField::Ports => merge_by_key(&mut next.ports, &top.ports, |port| &port.host_port),
        }
    }
}

/// Compute the next state of an app from its current state and a partial update.
pub fn merge(current: &AppState, update: &AppUpdate) -> AppState {
    let mut next = current.clone();
    for (field, _) in MERGE_POLICY {
        field.apply(&mut next, update);
    }
    next
}

/// Stack `top` onto `base`: values present in `top` win, collections merge by key.
pub fn overlay(base: &AppUpdate, top: &AppUpdate) -> AppUpdate {
    let mut next = base.clone();
    for (field, _) in MERGE_POLICY {
        field.stack(&mut next, top);
    }
    next
}

/// Apply explicit deletions.
pub fn prune(current: &AppState, removal: &AppRemoval) -> AppState {
    let mut next = current.clone();
    next.env_vars.retain(|var| !removal.env_keys.contains(&var.key));
    next.volumes.retain(|volume| !removal.container_paths.contains(&volume.container_path));
    next.ports.retain(|port| !removal.host_ports.contains(&port.host_port));
    if removal.http_auth {
        next.http_auth = None;
    }
    next
}

fn replace_if_present<T: Clone>(slot: &mut T, value: &Option<T>) {
    if let Some(value) = value {
        *slot = value.clone();
    }
}

fn or_replace<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
    if value.is_some() {
        *slot = value.clone();
    }
}

/// Overwrite entries in place by key and append unseen ones, preserving order.
fn merge_by_key<T, K, F>(current: &mut Vec<T>, incoming: &[T], key: F)
where
    T: Clone,
    K: PartialEq + ?Sized,
    F: Fn(&T) -> &K,
{
    for entry in incoming {
        match current.iter_mut().find(|existing| key(existing) == key(entry)) {
            Some(existing) => *existing = entry.clone(),
            None => current.push(entry.clone()),
        }
    }
}

/// Volumes merge by container path; an existing host-path mount keeps its reference form.
fn merge_volumes(current: &mut Vec<Volume>, incoming: &[Volume]) {
    for volume in incoming {
        match current.iter_mut().find(|existing| existing.container_path == volume.container_path) {
            Some(existing) if matches!(existing.source, VolumeSource::HostPath(_)) => {}
            Some(existing) => *existing = volume.clone(),
            None => current.push(volume.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::domain::{EnvVar, HttpAuth, PortMapping};

    fn current_state() -> AppState {
        let mut state = AppState::new("test-app", true);
        state.env_vars = vec![EnvVar::new("EXISTING_ENV_VAR", "old_value")];
        state.volumes = vec![Volume::host_path("/old_path", "/container_path")];
        state
    }

    #[test]
    fn adds_environment_variables_after_existing_ones() {
        let update = AppUpdate {
            env_vars: vec![EnvVar::new("ANOTHER", "foobar")],
            ..AppUpdate::default()
        };

        let next = merge(&current_state(), &update);
        assert_eq!(
            next.env_vars,
            vec![EnvVar::new("EXISTING_ENV_VAR", "old_value"), EnvVar::new("ANOTHER", "foobar")]
        );
    }

    #[test]
    fn overwrites_env_var_in_place() {
        let update = AppUpdate {
            env_vars: vec![EnvVar::new("EXISTING_ENV_VAR", "new_value")],
            ..AppUpdate::default()
        };

        let next = merge(&current_state(), &update);
        assert_eq!(next.env_vars, vec![EnvVar::new("EXISTING_ENV_VAR", "new_value")]);
    }

    #[test]
    fn update_without_volumes_keeps_existing_volumes() {
        let next = merge(&current_state(), &AppUpdate::scale(2));
        assert_eq!(next.volumes, vec![Volume::host_path("/old_path", "/container_path")]);
        assert_eq!(next.instance_count, 2);
    }

    #[test]
    fn host_path_volume_keeps_its_reference_form() {
        let update = AppUpdate {
            volumes: vec![Volume::named("fresh", "/container_path")],
            ..AppUpdate::default()
        };

        let next = merge(&current_state(), &update);
        assert_eq!(next.volumes, vec![Volume::host_path("/old_path", "/container_path")]);
    }

    #[test]
    fn named_volume_is_replaced_and_new_paths_are_added() {
        let mut state = current_state();
        state.volumes = vec![Volume::named("old", "/data")];
        let update = AppUpdate {
            volumes: vec![Volume::named("new", "/data"), Volume::named("logs", "/logs")],
            ..AppUpdate::default()
        };

        let next = merge(&state, &update);
        assert_eq!(next.volumes, vec![Volume::named("new", "/data"), Volume::named("logs", "/logs")]);
    }

    #[test]
    fn ports_merge_by_host_port() {
        let mut state = current_state();
        state.ports = vec![PortMapping { host_port: 8080, container_port: 80 }];
        let update = AppUpdate {
            ports: vec![
                PortMapping { host_port: 8080, container_port: 8000 },
                PortMapping { host_port: 443, container_port: 443 },
            ],
            ..AppUpdate::default()
        };

        let next = merge(&state, &update);
        assert_eq!(
            next.ports,
            vec![
                PortMapping { host_port: 8080, container_port: 8000 },
                PortMapping { host_port: 443, container_port: 443 },
            ]
        );
    }

    #[test]
    fn http_auth_is_replaced_wholesale() {
        let mut state = current_state();
        state.http_auth = Some(HttpAuth::new("old", "old-pass"));
        let update = AppUpdate {
            http_auth: Some(HttpAuth::new("new", "new-pass")),
            ..AppUpdate::default()
        };

        let next = merge(&state, &update);
        assert_eq!(
            next.http_auth,
            Some(HttpAuth::new("new", "new-pass"))
        );
        assert_eq!(merge(&state, &AppUpdate::default()).http_auth, state.http_auth);
    }

    #[test]
    fn policy_table_covers_collections_as_additive() {
        assert_eq!(AppField::EnvVars.policy(), MergePolicy::AdditiveByKey);
        assert_eq!(AppField::Volumes.policy(), MergePolicy::AdditiveByKey);
        assert_eq!(AppField::Ports.policy(), MergePolicy::AdditiveByKey);
        assert_eq!(AppField::Command.policy(), MergePolicy::ReplaceIfPresent);
        assert_eq!(AppField::InstanceCount.policy(), MergePolicy::ReplaceIfPresent);
    }

    #[test]
    fn prune_removes_only_named_entries() {
        let mut state = current_state();
        state.env_vars.push(EnvVar::new("KEEP", "1"));
        state.http_auth = Some(HttpAuth::new("u", "p"));
        let removal = AppRemoval {
            env_keys: vec!["EXISTING_ENV_VAR".into()],
            http_auth: true,
            ..AppRemoval::default()
        };

        let next = prune(&state, &removal);
        assert_eq!(next.env_vars, vec![EnvVar::new("KEEP", "1")]);
        assert_eq!(next.volumes, state.volumes);
        assert_eq!(next.http_auth, None);
    }

    #[test]
    fn overlay_prefers_top_values_and_merges_collections() {
        let base = AppUpdate {
            expose_as_web_app: Some(true),
            container_http_port: Some(3000),
            env_vars: vec![EnvVar::new("A", "1"), EnvVar::new("B", "2")],
            volumes: vec![Volume::named("data", "/data")],
            ..AppUpdate::default()
        };
        let top = AppUpdate {
            expose_as_web_app: Some(false),
            env_vars: vec![EnvVar::new("B", "3")],
            volumes: vec![Volume::host_path("/srv/data", "/data")],
            ..AppUpdate::default()
        };

        let stacked = overlay(&base, &top);
        assert_eq!(stacked.expose_as_web_app, Some(false));
        assert_eq!(stacked.container_http_port, Some(3000));
        assert_eq!(stacked.env_vars, vec![EnvVar::new("A", "1"), EnvVar::new("B", "3")]);
        assert_eq!(stacked.volumes, vec![Volume::host_path("/srv/data", "/data")]);
    }

    fn env_strategy() -> impl Strategy<Value = Vec<EnvVar>> {
        prop::collection::vec(("[A-C]{1,2}", "[a-z0-9]{0,4}"), 0..5)
            .prop_map(|pairs| pairs.into_iter().map(|(k, v)| EnvVar::new(k, v)).collect())
    }

    fn volume_strategy() -> impl Strategy<Value = Vec<Volume>> {
        prop::collection::vec(("/(a|b|c)", "[a-z]{1,3}", any::<bool>()), 0..4).prop_map(|items| {
            items
                .into_iter()
                .map(|(path, source, host)| {
                    if host {
                        Volume::host_path(format!("/srv/{}", source), path)
                    } else {
                        Volume::named(source, path)
                    }
                })
                .collect()
        })
    }

    fn port_strategy() -> impl Strategy<Value = Vec<PortMapping>> {
        prop::collection::vec((1u16..4, 1u16..4), 0..4).prop_map(|pairs| {
            pairs
                .into_iter()
                .map(|(host_port, container_port)| PortMapping { host_port, container_port })
                .collect()
        })
    }

    fn auth_strategy() -> impl Strategy<Value = Option<HttpAuth>> {
        prop::option::of(("[a-z]{1,3}", "[a-z]{1,3}"))
            .prop_map(|auth| auth.map(|(user, password)| HttpAuth::new(user, password)))
    }

    prop_compose! {
        fn state_strategy()(
            instance_count in 0u32..4,
            expose in any::<bool>(),
            command in prop::option::of(prop::collection::vec("[a-z]{1,4}", 1..3)),
            env_vars in env_strategy(),
            volumes in volume_strategy(),
            ports in port_strategy(),
            http_auth in auth_strategy(),
        ) -> AppState {
            let mut state = AppState::new("prop-app", !volumes.is_empty());
            state.instance_count = instance_count;
            state.expose_as_web_app = expose;
            state.command = command;
            state.env_vars = env_vars;
            state.volumes = volumes;
            state.ports = ports;
            state.http_auth = http_auth;
            state
        }
    }

    prop_compose! {
        fn update_strategy()(
            instance_count in prop::option::of(0u32..4),
            expose in prop::option::of(any::<bool>()),
            container_http_port in prop::option::of(1u16..9000),
            command in prop::option::of(prop::collection::vec("[a-z]{1,4}", 1..3)),
            env_vars in env_strategy(),
            volumes in volume_strategy(),
            ports in port_strategy(),
            http_auth in auth_strategy(),
        ) -> AppUpdate {
            AppUpdate {
                instance_count,
                expose_as_web_app: expose,
                container_http_port,
                command,
                env_vars,
                volumes,
                ports,
                http_auth,
                ..AppUpdate::default()
            }
        }
    }

    proptest! {
        #[test]
        fn merge_is_idempotent(state in state_strategy(), update in update_strategy()) {
            let once = merge(&state, &update);
            let twice = merge(&once, &update);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn empty_update_is_a_no_op(state in state_strategy()) {
            prop_assert_eq!(merge(&state, &AppUpdate::default()), state);
        }

        #[test]
        fn merge_never_drops_existing_keys(state in state_strategy(), update in update_strategy()) {
            let next = merge(&state, &update);
            for var in &state.env_vars {
                prop_assert!(next.env_vars.iter().any(|candidate| candidate.key == var.key));
            }
            for volume in &state.volumes {
                prop_assert!(next.volumes.iter().any(|candidate| candidate.container_path == volume.container_path));
            }
            for port in &state.ports {
                prop_assert!(next.ports.iter().any(|candidate| candidate.host_port == port.host_port));
            }
        }
    }
}
