//! Integration test: chain primitives on hand-built bone chains.
//!
//! Checks the closed-form two-bone solve and FABRIK against known poses:
//! 1. A straight leg bends its knee forward by the analytic angle
//! 2. A zig-zag spine reaches a raised head with the pelvis pinned
//! 3. Random targets never change any bone length

use approx::assert_relative_eq;
use nalgebra::Vector3;

use stride_core::types::BonePose;
use stride_ik::bone::{self, VirtualBone};
use stride_test_utils::random_points;

fn chain(points: &[[f32; 3]]) -> Vec<VirtualBone> {
    let mut bones: Vec<VirtualBone> = points
        .iter()
        .map(|p| VirtualBone::new(&BonePose::at(Vector3::new(p[0], p[1], p[2]))))
        .collect();
    bone::presolve(&mut bones);
    bones
}

fn lengths(bones: &[VirtualBone]) -> Vec<f32> {
    bones
        .windows(2)
        .map(|w| (w[1].solver_position - w[0].solver_position).norm())
        .collect()
}

#[test]
fn straight_leg_bends_knee_forward_by_analytic_angle() {
    // Thigh, calf, foot and a 0.2 m toe segment pointing forward.
    let mut bones = chain(&[[0.0, 0.0, 1.0], [0.0, 0.0, 0.5], [0.0, 0.0, 0.0], [0.2, 0.0, 0.0]]);
    let before = lengths(&bones);
    let target = Vector3::new(0.0, 0.0, 0.1);

    // Limb direction is -Z, so bending about +Y bows the knee toward +X.
    bone::solve_trigonometric(&mut bones, 0, 1, 2, &target, &Vector3::y(), 1.0);

    assert_relative_eq!(bones[2].solver_position, target, epsilon = 1e-4);
    assert!(bones[1].solver_position.x > 0.1, "knee should bow forward");

    let upper = bones[1].solver_position - bones[0].solver_position;
    let lower = bones[2].solver_position - bones[1].solver_position;
    let bend = upper.angle(&lower);
    assert_relative_eq!(bend, 2.0 * 0.9_f32.acos(), epsilon = 1e-3);

    for (a, b) in lengths(&bones).iter().zip(before) {
        assert_relative_eq!(*a, b, epsilon = 1e-5);
    }
}

#[test]
fn zig_zag_spine_reaches_raised_head() {
    let mut bones = chain(&[[0.0, 0.0, 1.0], [0.15, 0.0, 1.2], [0.0, 0.0, 1.4], [0.15, 0.0, 1.55]]);
    let before = lengths(&bones);
    let total: f32 = before.iter().sum();
    let pelvis = bones[0].solver_position;
    let head = bones[3].solver_position + Vector3::new(0.0, 0.0, 0.1);

    bone::solve_fabrik(&mut bones, &pelvis, &head, 1.0, 0.0, 50, total, &Vector3::zeros());

    assert_relative_eq!(bones[0].solver_position, pelvis);
    assert_relative_eq!(bones[3].solver_position, head, epsilon = 1e-3);
    let after = lengths(&bones);
    for (a, b) in after.iter().zip(&before) {
        assert_relative_eq!(a, b, epsilon = 1e-4);
    }
    assert_relative_eq!(after.iter().sum::<f32>(), total, epsilon = 1e-4);
}

#[test]
fn random_targets_preserve_lengths() {
    let targets = random_points(7, 32, Vector3::new(0.0, 0.0, 0.6), 1.5);
    for target in targets {
        let mut leg = chain(&[[0.0, 0.0, 1.0], [0.05, 0.0, 0.5], [0.0, 0.0, 0.05], [0.15, 0.0, 0.0]]);
        let mut spine = chain(&[[0.0, 0.0, 1.0], [0.02, 0.0, 1.2], [0.0, 0.0, 1.4], [0.01, 0.0, 1.6]]);
        let leg_before = lengths(&leg);
        let spine_before = lengths(&spine);

        bone::solve_trigonometric(&mut leg, 0, 1, 2, &target, &Vector3::y(), 1.0);
        let start = spine[0].solver_position;
        bone::solve_fabrik(&mut spine, &start, &target, 1.0, 0.0, 4, 0.6, &Vector3::zeros());

        for (a, b) in lengths(&leg).iter().zip(leg_before) {
            assert_relative_eq!(*a, b, epsilon = 1e-4);
        }
        for (a, b) in lengths(&spine).iter().zip(spine_before) {
            assert_relative_eq!(*a, b, epsilon = 1e-4);
        }
    }
}

#[test]
fn unreachable_target_never_stretches_the_leg() {
    let mut bones = chain(&[[0.0, 0.0, 1.0], [0.05, 0.0, 0.5], [0.0, 0.0, 0.0]]);
    let before = lengths(&bones);
    bone::solve_trigonometric(&mut bones, 0, 1, 2, &Vector3::new(0.0, 0.0, -3.0), &Vector3::y(), 1.0);
    for (a, b) in lengths(&bones).iter().zip(before) {
        assert_relative_eq!(*a, b, epsilon = 1e-5);
    }
    assert!(bones[2].solver_position.z > -0.01);
}
