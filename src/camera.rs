//! Third- and first-person camera rigs.
//!
//! Both rigs live on the camera entity and point at a character through
//! `target`. The third-person rig orbits a *floater* point above the
//! character: orbit input, lazy height re-centering, platform following,
//! collision pull-in with a short tween, and a landing nod. The
//! first-person rig pitches a head joint and yaws the body, except in
//! prevent-rotation states where the yaw goes to the head alone.
//!
//! Camera systems run in `Update` on render time; they only read the
//! fixed-step components, so the two clocks never fight over state.

use bevy::prelude::*;

use crate::backend::PhysicsBackend;
use crate::collision::RayHit;
use crate::config::CharacterController;
use crate::intent::InputIntent;
use crate::state::{MotionState, StateChanged, TransitionTable};

/// Linear position tween, the collision pull-in and center snap both use
/// it. While one is in flight it owns the camera position outright.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct CamTween {
    pub from: Vec3,
    pub to: Vec3,
    pub elapsed: f32,
    pub duration: f32,
}

impl CamTween {
    fn sample(&self) -> Vec3 {
        if self.duration <= f32::EPSILON {
            return self.to;
        }
        let t = (self.elapsed / self.duration).clamp(0.0, 1.0);
        self.from.lerp(self.to, t)
    }

    fn finished(&self) -> bool {
        self.elapsed >= self.duration
    }
}

/// Landing nod on the floater: dip down, come back, settle.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct CamShake {
    pub strength: f32,
    pub elapsed: f32,
}

/// Phase lengths of the nod, in seconds.
const SHAKE_DOWN: f32 = 0.25;
const SHAKE_BACK: f32 = 0.15;
const SHAKE_SETTLE: f32 = 0.05;

impl CamShake {
    /// Vertical floater displacement at the current point of the nod.
    fn offset(&self) -> f32 {
        let t = self.elapsed;
        if t < SHAKE_DOWN {
            -self.strength * (t / SHAKE_DOWN)
        } else if t < SHAKE_DOWN + SHAKE_BACK {
            -self.strength * (1.0 - (t - SHAKE_DOWN) / SHAKE_BACK)
        } else {
            // Settle phase; the return leg already reached zero.
            0.0
        }
    }

    fn finished(&self) -> bool {
        self.elapsed >= SHAKE_DOWN + SHAKE_BACK + SHAKE_SETTLE
    }
}

/// What the third-person rig reads about its character each frame.
pub(crate) struct CameraTargetView {
    pub translation: Vec3,
    pub yaw: f32,
    pub state: MotionState,
    /// Translation of the platform the character rides, if any.
    pub platform: Option<Vec3>,
    /// Orbit input, `x` yaw right, `y` pitch up.
    pub orbit: Vec2,
    pub center_pressed: bool,
}

/// Third-person orbit camera.
///
/// Spawn on the camera entity with [`ThirdPersonCamera::new`] pointing at
/// the character. The rig keeps the camera between `min_distance` and
/// `max_distance` from the floater, clamps its height offset, drifts the
/// height back toward `height_average` when outside the comfort band, and
/// pulls in front of geometry that blocks the line of sight.
#[derive(Component, Reflect, Debug, Clone)]
#[reflect(Component)]
pub struct ThirdPersonCamera {
    /// Character this camera follows.
    pub target: Entity,
    /// Preferred orbit distance, used by the center snap.
    pub distance: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    /// Height offset clamp range above the floater.
    pub min_height: f32,
    pub max_height: f32,
    /// Comfort height the lazy drift pulls back toward.
    pub height_average: f32,
    /// Dead band around the average where the height is left alone.
    pub height_band: f32,
    /// Drift speed back into the band, units per second.
    pub height_drift_speed: f32,
    /// Seconds per unit of travel for the collision pull-in tween; also
    /// the flat duration of a center snap.
    pub reposition_rate: f32,
    /// Floater point relative to the character origin.
    pub floater_offset: Vec3,
    /// Orbit speed per input axis, scaled by the current distance.
    pub orbit_speed: Vec2,
    tween: Option<CamTween>,
    shake: Option<CamShake>,
    platform_last: Option<Vec3>,
    reposition_request: Option<Vec3>,
    center_request: bool,
}

impl Default for ThirdPersonCamera {
    fn default() -> Self {
        Self {
            target: Entity::PLACEHOLDER,
            distance: 3.5,
            min_distance: 2.0,
            max_distance: 5.0,
            min_height: 0.25,
            max_height: 4.0,
            height_average: 2.125,
            height_band: 0.2,
            height_drift_speed: 1.0,
            reposition_rate: 0.025,
            floater_offset: Vec3::new(0.0, 1.5, 0.0),
            orbit_speed: Vec2::new(8.0, 4.0),
            tween: None,
            shake: None,
            platform_last: None,
            reposition_request: None,
            center_request: false,
        }
    }
}

impl ThirdPersonCamera {
    pub fn new(target: Entity) -> Self {
        Self {
            target,
            ..default()
        }
    }

    /// Teleport the camera next frame, bypassing tweens and clamps.
    pub fn request_reposition(&mut self, position: Vec3) {
        self.reposition_request = Some(position);
    }

    /// Snap behind the character next frame.
    pub fn center(&mut self) {
        self.center_request = true;
    }

    /// Nod the floater down by `strength` and back. Skipped while a
    /// reposition tween is in flight, the two would fight over the view.
    pub fn shake(&mut self, strength: f32) {
        if self.tween.is_some() {
            return;
        }
        self.shake = Some(CamShake {
            strength,
            elapsed: 0.0,
        });
    }

    fn floater(&self, target_translation: Vec3) -> Vec3 {
        let nod = self.shake.map(|shake| shake.offset()).unwrap_or(0.0);
        target_translation + self.floater_offset + Vec3::Y * nod
    }

    /// One camera update. `ray` casts from an origin along a direction up
    /// to a distance and reports the nearest blocker, excluding the
    /// character.
    pub(crate) fn update<F>(
        &mut self,
        transform: &mut Transform,
        view: &CameraTargetView,
        ray: F,
        dt: f32,
    ) where
        F: Fn(Vec3, Vec3, f32) -> Option<RayHit>,
    {
        if let Some(mut shake) = self.shake {
            shake.elapsed += dt;
            self.shake = if shake.finished() { None } else { Some(shake) };
        }

        if let Some(position) = self.reposition_request.take() {
            transform.translation = position;
        }

        let floater = self.floater(view.translation);

        // Platforms are followed by delta, except while airborne where
        // the arc should read as world motion. Tracked every frame so a
        // tween never leaves a stale position behind.
        let platform = view
            .platform
            .filter(|_| !matches!(view.state, MotionState::Jump | MotionState::Fall));

        // A running tween owns the position until it lands.
        if let Some(mut tween) = self.tween {
            tween.elapsed += dt;
            transform.translation = tween.sample();
            self.tween = if tween.finished() { None } else { Some(tween) };
            self.platform_last = platform;
            transform.look_at(floater, Vec3::Y);
            return;
        }

        if self.center_request || view.center_pressed {
            self.center_request = false;
            let backward = Vec3::new(view.yaw.sin(), 0.0, view.yaw.cos());
            let to = view.translation + backward * self.distance + Vec3::Y * self.floater_offset.y;
            self.tween = Some(CamTween {
                from: transform.translation,
                to,
                elapsed: 0.0,
                duration: self.reposition_rate,
            });
            self.platform_last = platform;
            transform.look_at(floater, Vec3::Y);
            return;
        }

        // Horizontal offset from the floater drives the distance logic.
        let mut to_floater = floater - transform.translation;
        to_floater.y = 0.0;
        let mut camdist = to_floater.length();
        let camvec = to_floater.normalize_or_zero();

        // Orbit: positive input turns the view right / tilts it up, which
        // moves the camera the opposite way around the character.
        let right = transform.rotation * Vec3::X;
        let up = transform.rotation * Vec3::Y;
        transform.translation -= right * (view.orbit.x * self.orbit_speed.x * camdist * dt);
        transform.translation -= up * (view.orbit.y * self.orbit_speed.y * camdist * dt);

        if let Some(platform) = platform {
            if let Some(last) = self.platform_last {
                transform.translation += platform - last;
            }
        }
        self.platform_last = platform;

        // Hard height clamp against the floater.
        let mut offset_y = transform.translation.y - floater.y;
        if offset_y < self.min_height {
            transform.translation.y = floater.y + self.min_height;
            offset_y = self.min_height;
        } else if offset_y > self.max_height {
            transform.translation.y = floater.y + self.max_height;
            offset_y = self.max_height;
        }

        // Lazy re-centering: outside the comfort band the height glides
        // back toward the average, inside it nothing moves.
        if offset_y > self.height_average + self.height_band {
            transform.translation.y -= self.height_drift_speed * dt;
        } else if offset_y < self.height_average - self.height_band {
            transform.translation.y += self.height_drift_speed * dt;
        }

        if camdist > self.max_distance {
            transform.translation += camvec * (camdist - self.max_distance);
            camdist = self.max_distance;
        }

        // Line-of-sight check from the floater out to the camera; a
        // blocker pulls the camera in front of it over a short tween.
        let mut blocked = false;
        let to_camera = transform.translation - floater;
        let reach = to_camera.length();
        if reach > f32::EPSILON {
            if let Some(hit) = ray(floater, to_camera / reach, reach) {
                blocked = true;
                let mut position = hit.point;
                position.x += hit.normal.x * 0.5;
                position.z += hit.normal.z * 0.5;
                let hit_offset = position.y - floater.y;
                if hit_offset < self.min_height {
                    position.y = floater.y + self.min_height;
                } else if hit_offset > self.max_height {
                    position.y = floater.y + self.max_height;
                }
                let travel = (position - floater).length();
                self.tween = Some(CamTween {
                    from: transform.translation,
                    to: position,
                    elapsed: 0.0,
                    duration: travel * self.reposition_rate,
                });
            }
        }

        if camdist < self.min_distance {
            if blocked {
                // No room to back out of the wall, go over the top.
                transform.translation.y = floater.y + self.max_height;
            } else {
                transform.translation -= camvec * (self.min_distance - camdist);
            }
        }

        transform.look_at(floater, Vec3::Y);
    }
}

/// Camera shake strength for a landing, full strength from 20 units of
/// downward speed.
pub(crate) fn landing_shake_strength(landing_speed: f32) -> f32 {
    landing_speed.min(20.0) / 20.0
}

/// First-person head rig.
///
/// Spawn on a camera entity that is a child of the character; the rig
/// writes the camera's local transform from the eye offset and the
/// accumulated pitch and head yaw. Look input yaws the whole body, except
/// in prevent-rotation states (hanging from a ledge) where it turns the
/// head alone within `head_yaw_limit_deg`.
#[derive(Component, Reflect, Debug, Clone)]
#[reflect(Component)]
pub struct FirstPersonCamera {
    /// Character this camera belongs to.
    pub target: Entity,
    /// Eye point relative to the character origin.
    pub eye_offset: Vec3,
    /// Look speed per input axis, degrees per second.
    pub look_speed_deg: Vec2,
    pub pitch_min_deg: f32,
    pub pitch_max_deg: f32,
    /// Head yaw range while the body may not rotate.
    pub head_yaw_limit_deg: f32,
    /// Current pitch, radians, positive looks up.
    pub pitch: f32,
    /// Current head-only yaw, radians, positive looks left.
    pub head_yaw: f32,
}

impl Default for FirstPersonCamera {
    fn default() -> Self {
        Self {
            target: Entity::PLACEHOLDER,
            eye_offset: Vec3::new(0.0, 1.7, 0.0),
            look_speed_deg: Vec2::new(160.0, 100.0),
            pitch_min_deg: -80.0,
            pitch_max_deg: 90.0,
            head_yaw_limit_deg: 50.0,
            pitch: 0.0,
            head_yaw: 0.0,
        }
    }
}

impl FirstPersonCamera {
    pub fn new(target: Entity) -> Self {
        Self {
            target,
            ..default()
        }
    }

    /// Apply one frame of look input. Returns the yaw delta to apply to
    /// the body, zero while `prevented`.
    pub(crate) fn apply_look(&mut self, look: Vec2, prevented: bool, dt: f32) -> f32 {
        let pitch_delta = look.y * self.look_speed_deg.y.to_radians() * dt;
        self.pitch = (self.pitch + pitch_delta).clamp(
            self.pitch_min_deg.to_radians(),
            self.pitch_max_deg.to_radians(),
        );

        // Positive look.x turns the view right, which is a negative yaw.
        let yaw_delta = -(look.x * self.look_speed_deg.x.to_radians() * dt);
        if prevented {
            let limit = self.head_yaw_limit_deg.to_radians();
            self.head_yaw = (self.head_yaw + yaw_delta).clamp(-limit, limit);
            0.0
        } else {
            self.head_yaw = 0.0;
            yaw_delta
        }
    }

    /// Reset the head to straight ahead.
    pub fn center(&mut self) {
        self.pitch = 0.0;
        self.head_yaw = 0.0;
    }

    /// Local camera transform for the current head pose.
    pub(crate) fn local_transform(&self) -> Transform {
        Transform::from_translation(self.eye_offset)
            .with_rotation(Quat::from_rotation_y(self.head_yaw) * Quat::from_rotation_x(self.pitch))
    }
}

/// Drive every third-person camera.
///
/// Exclusive over the world: the rig reads its character across entities
/// and casts a line-of-sight ray through the physics backend, so the
/// system collects what it needs, computes, and writes the results back.
pub(crate) fn update_third_person_cameras<B: PhysicsBackend>(world: &mut World) {
    let dt = world.resource::<Time>().delta_secs();

    let mut rigs = world.query::<(Entity, &ThirdPersonCamera, &Transform)>();
    let cameras: Vec<(Entity, ThirdPersonCamera, Transform)> = rigs
        .iter(world)
        .map(|(entity, camera, transform)| (entity, camera.clone(), *transform))
        .collect();

    for (entity, mut camera, mut transform) in cameras {
        let target = camera.target;
        let Some(character) = world.get::<Transform>(target).copied() else {
            continue;
        };
        let Some(controller) = world.get::<CharacterController>(target) else {
            continue;
        };
        let state = controller.state;
        let platform = controller.active_platform.and_then(|platform| {
            world
                .get::<GlobalTransform>(platform)
                .map(|global| global.translation())
        });
        let (orbit, center_pressed) = world
            .get::<InputIntent>(target)
            .map(|intent| (intent.camera, intent.center_camera))
            .unwrap_or((Vec2::ZERO, false));

        let view = CameraTargetView {
            translation: character.translation,
            yaw: character.rotation.to_euler(EulerRot::YXZ).0,
            state,
            platform,
            orbit,
            center_pressed,
        };
        camera.update(
            &mut transform,
            &view,
            |origin, direction, distance| B::raycast(world, origin, direction, distance, target),
            dt,
        );

        let Ok(mut entry) = world.get_entity_mut(entity) else {
            continue;
        };
        if let Some(mut stored) = entry.get_mut::<Transform>() {
            *stored = transform;
        }
        if let Some(mut stored) = entry.get_mut::<ThirdPersonCamera>() {
            *stored = camera;
        }
    }
}

/// Drive every first-person camera: body yaw in free states, head-only
/// yaw in prevent-rotation states, pitch always on the head.
pub(crate) fn update_first_person_cameras(
    time: Res<Time>,
    mut cameras: Query<
        (&mut FirstPersonCamera, &mut Transform),
        Without<CharacterController>,
    >,
    mut characters: Query<
        (
            &mut Transform,
            &CharacterController,
            &TransitionTable,
            &InputIntent,
        ),
        Without<FirstPersonCamera>,
    >,
) {
    let dt = time.delta_secs();
    for (mut camera, mut camera_transform) in &mut cameras {
        let Ok((mut body, controller, table, intent)) = characters.get_mut(camera.target) else {
            continue;
        };
        if intent.center_camera {
            camera.center();
        }
        let prevented = table.prevents_rotation(controller.state);
        let yaw_delta = camera.apply_look(intent.camera, prevented, dt);
        if yaw_delta != 0.0 {
            let yaw = body.rotation.to_euler(EulerRot::YXZ).0;
            body.rotation = Quat::from_rotation_y(yaw + yaw_delta);
        }
        *camera_transform = camera.local_transform();
    }
}

/// Nod the third-person camera on every landing, harder for faster falls.
pub(crate) fn shake_on_landing(
    mut changes: EventReader<StateChanged>,
    characters: Query<&CharacterController>,
    mut cameras: Query<&mut ThirdPersonCamera>,
) {
    for change in changes.read() {
        if change.to != MotionState::Land {
            continue;
        }
        let Ok(controller) = characters.get(change.entity) else {
            continue;
        };
        let strength = landing_shake_strength(controller.landing_speed);
        for mut camera in &mut cameras {
            if camera.target == change.entity {
                camera.shake(strength);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    const DT: f32 = 1.0 / 60.0;

    fn no_hit(_origin: Vec3, _direction: Vec3, _distance: f32) -> Option<RayHit> {
        None
    }

    fn view() -> CameraTargetView {
        CameraTargetView {
            translation: Vec3::ZERO,
            yaw: 0.0,
            state: MotionState::Idle,
            platform: None,
            orbit: Vec2::ZERO,
            center_pressed: false,
        }
    }

    /// Camera sitting behind the character inside every clamp.
    fn settled_camera() -> (ThirdPersonCamera, Transform) {
        let camera = ThirdPersonCamera::default();
        let transform = Transform::from_translation(Vec3::new(
            0.0,
            camera.floater_offset.y + camera.height_average,
            3.5,
        ));
        (camera, transform)
    }

    // ==================== Third person ====================

    #[test]
    fn looks_at_the_floater() {
        let (mut camera, mut transform) = settled_camera();
        camera.update(&mut transform, &view(), no_hit, DT);

        let forward = transform.rotation * Vec3::NEG_Z;
        let expected = (camera.floater(Vec3::ZERO) - transform.translation).normalize();
        assert_relative_eq!(forward.dot(expected), 1.0, epsilon = 1e-4);
    }

    #[test]
    fn inside_the_comfort_band_the_height_rests() {
        let (mut camera, mut transform) = settled_camera();
        let before = transform.translation.y;
        camera.update(&mut transform, &view(), no_hit, DT);
        assert_relative_eq!(transform.translation.y, before);
    }

    #[test]
    fn above_the_band_the_height_drifts_down() {
        let (mut camera, mut transform) = settled_camera();
        transform.translation.y = camera.floater_offset.y + camera.height_average + 0.5;
        let before = transform.translation.y;

        camera.update(&mut transform, &view(), no_hit, DT);
        assert_relative_eq!(
            transform.translation.y,
            before - camera.height_drift_speed * DT,
            epsilon = 1e-6
        );
    }

    #[test]
    fn below_the_band_the_height_drifts_up() {
        let (mut camera, mut transform) = settled_camera();
        transform.translation.y = camera.floater_offset.y + camera.height_average - 0.5;
        let before = transform.translation.y;

        camera.update(&mut transform, &view(), no_hit, DT);
        assert!(transform.translation.y > before);
    }

    #[test]
    fn height_offset_is_clamped_hard() {
        let (mut camera, mut transform) = settled_camera();
        transform.translation.y = 50.0;
        camera.update(&mut transform, &view(), no_hit, DT);
        // One drift step below the ceiling after the snap.
        let ceiling = camera.floater_offset.y + camera.max_height;
        assert!(transform.translation.y <= ceiling);
        assert!(transform.translation.y >= ceiling - camera.height_drift_speed * DT - 1e-5);
    }

    #[test]
    fn too_far_pulls_the_camera_in() {
        let (mut camera, mut transform) = settled_camera();
        transform.translation.z = 9.0;
        camera.update(&mut transform, &view(), no_hit, DT);

        let horizontal = Vec2::new(transform.translation.x, transform.translation.z).length();
        assert_relative_eq!(horizontal, camera.max_distance, epsilon = 1e-4);
    }

    #[test]
    fn too_close_pushes_the_camera_out() {
        let (mut camera, mut transform) = settled_camera();
        transform.translation.z = 0.5;
        camera.update(&mut transform, &view(), no_hit, DT);

        let horizontal = Vec2::new(transform.translation.x, transform.translation.z).length();
        assert_relative_eq!(horizontal, camera.min_distance, epsilon = 1e-4);
    }

    #[test]
    fn orbit_input_moves_against_the_stick() {
        let (mut camera, mut transform) = settled_camera();
        camera.update(&mut transform, &view(), no_hit, DT);
        let x_before = transform.translation.x;

        let mut turning = view();
        turning.orbit = Vec2::new(1.0, 0.0);
        camera.update(&mut transform, &turning, no_hit, DT);
        // Looking right orbits the camera toward local -X.
        assert!(transform.translation.x < x_before);
    }

    #[test]
    fn platform_deltas_carry_the_camera() {
        let (mut camera, mut transform) = settled_camera();
        let mut riding = view();
        riding.platform = Some(Vec3::ZERO);
        camera.update(&mut transform, &riding, no_hit, DT);
        let before = transform.translation.x;

        riding.platform = Some(Vec3::new(0.4, 0.0, 0.0));
        camera.update(&mut transform, &riding, no_hit, DT);
        assert_relative_eq!(transform.translation.x, before + 0.4, epsilon = 1e-5);
    }

    #[test]
    fn airborne_states_drop_the_platform_follow() {
        let (mut camera, mut transform) = settled_camera();
        let mut riding = view();
        riding.platform = Some(Vec3::ZERO);
        camera.update(&mut transform, &riding, no_hit, DT);

        riding.state = MotionState::Jump;
        riding.platform = Some(Vec3::new(5.0, 0.0, 0.0));
        let before = transform.translation.x;
        camera.update(&mut transform, &riding, no_hit, DT);
        assert_relative_eq!(transform.translation.x, before, epsilon = 1e-5);
    }

    #[test]
    fn blockers_start_a_pull_in_tween() {
        let (mut camera, mut transform) = settled_camera();
        let blocker = |_origin: Vec3, _direction: Vec3, _distance: f32| {
            Some(RayHit::new(
                1.5,
                Vec3::new(0.0, 1.5, 1.5),
                Vec3::new(0.0, 0.0, -1.0),
                Entity::PLACEHOLDER,
            ))
        };
        camera.update(&mut transform, &view(), blocker, DT);

        let tween = camera.tween.expect("pull-in started");
        // Pushed off the wall along the (horizontal) normal, then lifted
        // to the minimum height above the floater.
        assert_relative_eq!(tween.to.z, 1.0, epsilon = 1e-5);
        assert_relative_eq!(
            tween.to.y,
            camera.floater_offset.y + camera.min_height,
            epsilon = 1e-5
        );
        let travel = (tween.to - camera.floater(Vec3::ZERO)).length();
        assert_relative_eq!(tween.duration, travel * camera.reposition_rate, epsilon = 1e-5);
    }

    #[test]
    fn tween_owns_the_position_until_done() {
        let (mut camera, mut transform) = settled_camera();
        camera.tween = Some(CamTween {
            from: Vec3::new(0.0, 2.0, 4.0),
            to: Vec3::new(0.0, 2.0, 2.0),
            elapsed: 0.0,
            duration: 0.2,
        });

        camera.update(&mut transform, &view(), no_hit, 0.1);
        assert_relative_eq!(transform.translation.z, 3.0, epsilon = 1e-5);
        assert!(camera.tween.is_some());

        camera.update(&mut transform, &view(), no_hit, 0.15);
        assert_relative_eq!(transform.translation.z, 2.0, epsilon = 1e-5);
        assert!(camera.tween.is_none());
    }

    #[test]
    fn blocked_close_quarters_lift_instead() {
        let (mut camera, mut transform) = settled_camera();
        // Inside min distance with a wall right behind.
        transform.translation = Vec3::new(0.0, 2.0, 1.0);
        let blocker = |_origin: Vec3, _direction: Vec3, _distance: f32| {
            Some(RayHit::new(
                0.5,
                Vec3::new(0.0, 1.8, 0.9),
                Vec3::new(0.0, 0.0, -1.0),
                Entity::PLACEHOLDER,
            ))
        };
        camera.update(&mut transform, &view(), blocker, DT);
        assert_relative_eq!(
            transform.translation.y,
            camera.floater_offset.y + camera.max_height,
            epsilon = 1e-5
        );
    }

    #[test]
    fn center_snaps_behind_the_character() {
        let (mut camera, mut transform) = settled_camera();
        transform.translation = Vec3::new(4.0, 2.0, -1.0);
        let mut centering = view();
        centering.center_pressed = true;

        camera.update(&mut transform, &centering, no_hit, DT);
        let tween = camera.tween.expect("center tween");
        assert_relative_eq!(tween.to.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(tween.to.z, camera.distance, epsilon = 1e-5);
        assert_relative_eq!(tween.to.y, camera.floater_offset.y, epsilon = 1e-5);
        assert_relative_eq!(tween.duration, camera.reposition_rate);
    }

    #[test]
    fn shake_nods_down_and_back() {
        let mut camera = ThirdPersonCamera::default();
        camera.shake(1.0);

        let mut shake = camera.shake.expect("shake running");
        shake.elapsed = SHAKE_DOWN / 2.0;
        assert_relative_eq!(shake.offset(), -0.5);
        shake.elapsed = SHAKE_DOWN;
        assert_relative_eq!(shake.offset(), -1.0);
        shake.elapsed = SHAKE_DOWN + SHAKE_BACK / 2.0;
        assert_relative_eq!(shake.offset(), -0.5);
        shake.elapsed = SHAKE_DOWN + SHAKE_BACK + SHAKE_SETTLE;
        assert!(shake.finished());
    }

    #[test]
    fn shake_skipped_while_repositioning() {
        let mut camera = ThirdPersonCamera::default();
        camera.tween = Some(CamTween {
            from: Vec3::ZERO,
            to: Vec3::ONE,
            elapsed: 0.0,
            duration: 0.5,
        });
        camera.shake(1.0);
        assert!(camera.shake.is_none());
    }

    #[test]
    fn landing_strength_caps_at_terminal_speed() {
        assert_relative_eq!(landing_shake_strength(10.0), 0.5);
        assert_relative_eq!(landing_shake_strength(20.0), 1.0);
        assert_relative_eq!(landing_shake_strength(35.0), 1.0);
    }

    // ==================== First person ====================

    #[test]
    fn pitch_accumulates_and_clamps() {
        let mut camera = FirstPersonCamera::default();
        camera.apply_look(Vec2::new(0.0, 1.0), false, 0.1);
        assert!(camera.pitch > 0.0);

        // Hold up for a long time, the clamp kicks in.
        camera.apply_look(Vec2::new(0.0, 1.0), false, 10.0);
        assert_relative_eq!(camera.pitch, camera.pitch_max_deg.to_radians());

        camera.apply_look(Vec2::new(0.0, -1.0), false, 20.0);
        assert_relative_eq!(camera.pitch, camera.pitch_min_deg.to_radians());
    }

    #[test]
    fn free_states_yaw_the_body() {
        let mut camera = FirstPersonCamera::default();
        let delta = camera.apply_look(Vec2::new(1.0, 0.0), false, 0.1);
        // Looking right turns the body clockwise.
        assert!(delta < 0.0);
        assert_eq!(camera.head_yaw, 0.0);
    }

    #[test]
    fn prevent_rotation_turns_the_head_only() {
        let mut camera = FirstPersonCamera::default();
        let delta = camera.apply_look(Vec2::new(-1.0, 0.0), true, 0.1);
        assert_eq!(delta, 0.0);
        assert!(camera.head_yaw > 0.0);

        // The head stops at its limit.
        camera.apply_look(Vec2::new(-1.0, 0.0), true, 10.0);
        assert_relative_eq!(camera.head_yaw, camera.head_yaw_limit_deg.to_radians());
    }

    #[test]
    fn leaving_prevent_rotation_recenters_the_head() {
        let mut camera = FirstPersonCamera::default();
        camera.apply_look(Vec2::new(-1.0, 0.0), true, 0.5);
        assert!(camera.head_yaw != 0.0);

        camera.apply_look(Vec2::new(0.0, 0.0), false, DT);
        assert_eq!(camera.head_yaw, 0.0);
    }

    #[test]
    fn local_transform_sits_at_the_eyes() {
        let mut camera = FirstPersonCamera::default();
        camera.apply_look(Vec2::new(0.0, 1.0), false, 0.5);
        let local = camera.local_transform();
        assert_eq!(local.translation, camera.eye_offset);

        // Pitched up, the camera forward gains height.
        let forward = local.rotation * Vec3::NEG_Z;
        assert!(forward.y > 0.0);
    }
}
