//! The walk pattern generator: CoM QP, feet/trunk splines, replanning.

use nalgebra::{Isometry3, Point3, Vector2, Vector3};

use ambler_core::geometry::frame_yaw;
use ambler_core::params::HumanoidParameters;
use ambler_core::types::Side;
use ambler_footsteps::{make_supports, FootstepsPlanner, Support};
use ambler_qp::{polygon, Problem};

use crate::error::PlanError;
use crate::lipm::{Lipm, LipmTrajectory};
use crate::swing::{KickTrajectory, SwingFootCubic};
use crate::trajectory::{PartKind, Trajectory, TrajectoryPart};

pub struct WalkPatternGenerator {
    pub parameters: HumanoidParameters,
}

fn point(v: Vector3<f64>) -> Point3<f64> {
    Point3::from(v)
}

impl WalkPatternGenerator {
    pub fn new(parameters: HumanoidParameters) -> Self {
        Self { parameters }
    }

    /// Planner timesteps spanned by one support.
    pub fn support_timesteps(&self, support: &Support) -> usize {
        if support.kick {
            return self.parameters.kick_support_timesteps();
        }
        if !support.is_both() {
            return self.parameters.single_support_timesteps();
        }
        if support.start || support.end {
            self.parameters.startend_double_support_timesteps()
        } else {
            self.parameters.double_support_timesteps()
        }
    }

    /// Solve the CoM QP over the support sequence. Returns the sampled
    /// trajectory and the number of planned timesteps.
    fn plan_com(
        &self,
        supports: &[Support],
        t_start: f64,
        initial_pos: Vector2<f64>,
        initial_vel: Vector2<f64>,
        initial_acc: Vector2<f64>,
        old: Option<(&Trajectory, f64)>,
    ) -> Result<(LipmTrajectory, usize), PlanError> {
        let params = &self.parameters;

        // Horizon: accumulate support timesteps up to planned_timesteps.
        // While kicking, the current support AND the one after it are
        // always fully covered so the CoM knows the recovery posture.
        let mut timesteps = 0;
        let mut i = 0;
        while i < supports.len() {
            let is_kick = supports[i].kick;
            timesteps += self.support_timesteps(&supports[i]);

            if is_kick && i + 1 < supports.len() {
                i += 1;
                timesteps += self.support_timesteps(&supports[i]);
            }

            if timesteps >= params.planned_timesteps {
                if !is_kick {
                    timesteps = params.planned_timesteps;
                }
                break;
            }
            i += 1;
        }

        // Jerks kept from the former trajectory for a C2 replan.
        let kept_timesteps = match old {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            Some((_, t_replan)) => {
                (((t_replan - t_start) / params.dt).round() as usize).min(timesteps)
            }
            None => 0,
        };

        let mut problem = Problem::new();
        let lipm = Lipm::new(
            &mut problem,
            timesteps,
            params.omega(),
            params.dt,
            t_start,
            initial_pos,
            initial_vel,
            initial_acc,
        );

        if let Some((old_trajectory, _)) = old {
            for timestep in 0..kept_timesteps {
                let jerk =
                    old_trajectory.get_j_world_com(t_start + timestep as f64 * params.dt + 1e-6);
                problem.add_constraint(
                    lipm.jerk(timestep).eq(Vector2::new(jerk.x, jerk.y)),
                );
            }
        }

        let mut constrained_timesteps = 0;
        let mut last_support: Option<&Support> = None;

        for support in supports {
            last_support = Some(support);
            let step_timesteps = self.support_timesteps(support);
            let support_polygon = support.support_polygon();
            let support_frame = support.frame();

            let y_offset = if support.is_both() {
                0.0
            } else if support.kick {
                support.side().lateral_sign() * params.kick_zmp_target_y
            } else {
                support.side().lateral_sign() * params.foot_zmp_target_y
            };
            let x_offset = if support.kick {
                params.kick_zmp_target_x
            } else {
                params.foot_zmp_target_x
            };
            let zmp_target = support_frame * Point3::new(x_offset, y_offset, 0.0);

            let upper = (constrained_timesteps + step_timesteps).min(timesteps);
            for timestep in constrained_timesteps..upper {
                // The ZMP stays in the (shrunk) support polygon, except on
                // the tiles kept from the previous plan and the initial
                // state the QP cannot influence.
                if timestep > kept_timesteps {
                    problem.add_constraints(polygon::in_polygon_xy(
                        &lipm.zmp(timestep),
                        &support_polygon,
                        params.zmp_margin,
                    ));
                }

                problem.add_constraint(
                    lipm.zmp(timestep)
                        .eq(Vector2::new(zmp_target.x, zmp_target.y))
                        .soft(params.zmp_reference_weight),
                );
            }

            constrained_timesteps += step_timesteps;
            if constrained_timesteps >= timesteps {
                break;
            }
        }

        // Terminal stop on end supports: centroid position, zero velocity
        // and acceleration.
        if let Some(support) = last_support {
            if support.end {
                let target = support.frame().translation.vector;
                problem.add_constraint(
                    lipm.pos(timesteps).eq(Vector2::new(target.x, target.y)),
                );
                problem.add_constraint(lipm.vel(timesteps).eq(Vector2::zeros()));
                problem.add_constraint(lipm.acc(timesteps).eq(Vector2::zeros()));
            }
        }

        problem.solve()?;
        Ok((lipm.get_trajectory(&problem), timesteps))
    }

    fn add_support_knots(trajectory: &mut Trajectory, t: f64, support: &Support) {
        for footstep in &support.footsteps {
            let yaw = frame_yaw(&footstep.frame.rotation);
            trajectory.yaw_mut(footstep.side).add_point(t, yaw, 0.0);
        }
    }

    fn plan_feet(
        &self,
        trajectory: &mut Trajectory,
        old: Option<(&Trajectory, f64)>,
    ) -> Result<(), PlanError> {
        let params = &self.parameters;
        let supports = trajectory.supports.clone();
        let mut t = trajectory.t_start;

        Self::add_support_knots(trajectory, t, &supports[0]);
        trajectory
            .trunk_yaw
            .add_point(t, frame_yaw(&supports[0].frame().rotation), 0.0);

        if !supports[0].is_both() {
            // Starting mid-step: the flying foot yaw comes from the old
            // trajectory.
            let (old_trajectory, _) = old.ok_or(PlanError::MissingOldTrajectory)?;
            let side = supports[0].side().other();
            let yaw = frame_yaw(&old_trajectory.get_t_world_foot(side, t).rotation);
            trajectory.yaw_mut(side).add_point(t, yaw, 0.0);
        }

        for (step, support) in supports.iter().enumerate() {
            let part_t_start = t;

            let kind = if support.is_both() {
                t += if support.start || support.end {
                    params.startend_double_support_duration
                } else {
                    params.double_support_duration
                };
                Self::add_support_knots(trajectory, t, support);
                trajectory
                    .trunk_yaw
                    .add_point(t, frame_yaw(&support.frame().rotation), 0.0);
                PartKind::Double
            } else if support.kick {
                t += params.kick_support_duration;
                let kicking_side = support.side().other();

                let start = previous_footstep(&supports, step, kicking_side)?;
                let target = next_footstep(&supports, step, kicking_side)?;
                let t_world_opposite = support.footsteps[0].frame;

                let kick = KickTrajectory::make_trajectory(
                    kicking_side,
                    t - params.kick_support_duration,
                    t,
                    start.translation.vector,
                    target.translation.vector,
                    &t_world_opposite,
                    params,
                );

                Self::add_support_knots(trajectory, t, support);
                PartKind::Kick { kick }
            } else {
                let flying_side = support.side().other();
                let t_world_flying_target = next_footstep(&supports, step, flying_side)?;

                t += params.single_support_duration;

                let swing = if support.start {
                    // Step in progress: preserve the old swing exactly so
                    // contact timing survives the replan.
                    let (old_trajectory, t_replan) = old.ok_or(PlanError::MissingOldTrajectory)?;
                    let old_part = old_trajectory.find_part(t_replan);
                    match &old_part.kind {
                        PartKind::Single { swing } => SwingFootCubic::make_trajectory(
                            old_part.t_start,
                            old_part.t_end,
                            params.walk_foot_height,
                            params.walk_foot_rise_ratio,
                            (old_trajectory.t_world * point(swing.pos(old_part.t_start))).coords,
                            (old_trajectory.t_world * point(swing.pos(old_part.t_end))).coords,
                        ),
                        _ => return Err(PlanError::NotReplannable),
                    }
                } else {
                    let t_world_start_target = previous_footstep(&supports, step, flying_side)?;
                    SwingFootCubic::make_trajectory(
                        t - params.single_support_duration,
                        t,
                        params.walk_foot_height,
                        params.walk_foot_rise_ratio,
                        t_world_start_target.translation.vector,
                        t_world_flying_target.translation.vector,
                    )
                };

                let target_yaw = frame_yaw(&t_world_flying_target.rotation);
                trajectory.yaw_mut(flying_side).add_point(t, target_yaw, 0.0);
                // The trunk follows the step orientation.
                trajectory.trunk_yaw.add_point(t, target_yaw, 0.0);
                Self::add_support_knots(trajectory, t, support);
                PartKind::Single { swing }
            };

            trajectory.parts.push(TrajectoryPart {
                support: support.clone(),
                t_start: part_t_start,
                t_end: t,
                kind,
            });
        }

        trajectory.t_end = t;
        Ok(())
    }

    /// Plan a walk trajectory over `supports` starting at `t_start` from
    /// the given CoM position at rest.
    pub fn plan(
        &self,
        supports: &[Support],
        initial_com_world: Vector3<f64>,
        t_start: f64,
    ) -> Result<Trajectory, PlanError> {
        if supports.is_empty() {
            return Err(PlanError::EmptySupports);
        }

        let (com, timesteps) = self.plan_com(
            supports,
            t_start,
            initial_com_world.xy(),
            Vector2::zeros(),
            Vector2::zeros(),
            None,
        )?;

        let mut trajectory = Trajectory::new(
            t_start,
            self.parameters.walk_com_height,
            self.parameters.walk_trunk_pitch,
            supports.to_vec(),
            com,
            timesteps,
        );
        self.plan_feet(&mut trajectory, None)?;
        Ok(trajectory)
    }

    /// Replan over `supports` (which must contain the support in progress
    /// at `t_replan`), keeping CoM continuity with `old` up to second
    /// derivatives and preserving the swing in flight.
    pub fn replan(
        &self,
        supports: &[Support],
        old: &Trajectory,
        t_replan: f64,
    ) -> Result<Trajectory, PlanError> {
        if supports.is_empty() {
            return Err(PlanError::EmptySupports);
        }
        if t_replan < old.t_start || t_replan > old.t_end {
            return Err(PlanError::OutOfRange {
                t: t_replan,
                t_start: old.t_start,
                t_end: old.t_end,
            });
        }

        // Snap to the current part boundary so the step keeps its timing.
        let t_start = old.get_part_t_start(t_replan);

        let com_pos = old.get_p_world_com(t_start);
        let com_vel = old.get_v_world_com(t_start);
        let com_acc = old.get_a_world_com(t_start);

        let (com, timesteps) = self.plan_com(
            supports,
            t_start,
            com_pos.xy(),
            com_vel.xy(),
            com_acc.xy(),
            Some((old, t_replan)),
        )?;

        let mut trajectory = Trajectory::new(
            t_start,
            self.parameters.walk_com_height,
            self.parameters.walk_trunk_pitch,
            supports.to_vec(),
            com,
            timesteps,
        );
        self.plan_feet(&mut trajectory, Some((old, t_replan)))?;
        Ok(trajectory)
    }

    /// Supports can be replanned only from a single support followed by a
    /// single support; kicks and the trailing end supports cannot.
    pub fn can_replan_supports(&self, trajectory: &Trajectory, t_replan: f64) -> bool {
        if trajectory.parts.is_empty()
            || t_replan < trajectory.t_start
            || t_replan > trajectory.t_end
        {
            return false;
        }

        let current = trajectory.get_support(t_replan);
        let next = trajectory.get_next_support(t_replan);

        !current.is_both()
            && !next.is_both()
            && !current.kick
            && !current.end
            && !next.end
    }

    /// Produce a fresh support sequence from `planner`, starting from the
    /// contact state at `t_replan` and preserving the step in progress.
    pub fn replan_supports(
        &self,
        planner: &dyn FootstepsPlanner,
        trajectory: &Trajectory,
        t_replan: f64,
    ) -> Result<Vec<Support>, PlanError> {
        if !self.can_replan_supports(trajectory, t_replan) {
            return Err(PlanError::NotReplannable);
        }

        let current = trajectory.get_support(t_replan);
        let next = trajectory.get_next_support(t_replan);

        let support_side = current.side();
        let missing = |side: Side| {
            PlanError::InvalidSupports(format!("support has no footstep for side {side}"))
        };

        let (t_world_left, t_world_right) = if support_side == Side::Left {
            (
                current.footstep_frame(Side::Left).ok_or_else(|| missing(Side::Left))?,
                next.footstep_frame(Side::Right).ok_or_else(|| missing(Side::Right))?,
            )
        } else {
            (
                next.footstep_frame(Side::Left).ok_or_else(|| missing(Side::Left))?,
                current.footstep_frame(Side::Right).ok_or_else(|| missing(Side::Right))?,
            )
        };

        // Once the foot in flight lands, the current support foot moves
        // first: plan with the landed layout.
        let footsteps = planner.plan(support_side.other(), t_world_left, t_world_right);
        let mut supports = make_supports(
            &footsteps,
            false,
            self.parameters.has_double_support(),
            true,
        );

        let mut in_progress = current;
        in_progress.start = true;
        supports.insert(0, in_progress);

        Ok(supports)
    }

    /// The support tail starting at the part containing `t_replan`, head
    /// support re-tagged `start`.
    pub fn trim_supports(
        &self,
        trajectory: &Trajectory,
        t_replan: f64,
    ) -> Result<Vec<Support>, PlanError> {
        if t_replan < trajectory.t_start || t_replan > trajectory.t_end {
            return Err(PlanError::OutOfRange {
                t: t_replan,
                t_start: trajectory.t_start,
                t_end: trajectory.t_end,
            });
        }

        let mut supports = Vec::new();
        let mut index = trajectory
            .parts
            .partition_point(|part| part.t_end < t_replan)
            .min(trajectory.parts.len() - 1);

        let mut current = trajectory.parts[index].support.clone();
        current.start = true;
        supports.push(current.clone());

        while !current.end && index + 1 < trajectory.parts.len() {
            index += 1;
            current = trajectory.parts[index].support.clone();
            supports.push(current.clone());
        }

        Ok(supports)
    }
}

fn previous_footstep(
    supports: &[Support],
    step: usize,
    side: Side,
) -> Result<Isometry3<f64>, PlanError> {
    step.checked_sub(1)
        .and_then(|previous| supports[previous].footstep_frame(side))
        .ok_or_else(|| {
            PlanError::InvalidSupports(format!(
                "support {step} has no predecessor carrying the {side} foot"
            ))
        })
}

fn next_footstep(
    supports: &[Support],
    step: usize,
    side: Side,
) -> Result<Isometry3<f64>, PlanError> {
    supports
        .get(step + 1)
        .and_then(|next| next.footstep_frame(side))
        .ok_or_else(|| {
            PlanError::InvalidSupports(format!(
                "support {step} has no successor carrying the {side} foot"
            ))
        })
}
