//! Behaviour-driven tests for build step planning.
//!
//! These scenarios check the planned step list for representative hosts and
//! command-line options using rstest-bdd.

use camino::Utf8PathBuf;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use std::cell::{Cell, RefCell};
use ree_installer::context::{InstallOptions, InstallationContext};
use ree_installer::manifest::DistributionManifest;
use ree_installer::plan::plan_steps;
use ree_installer::platform::{DistroIdentity, OsFamily};
use ree_installer::test_utils::platform_info;

#[derive(Default)]
struct PlannerWorld {
    os: Cell<Option<OsFamily>>,
    machine: RefCell<String>,
    allocator_opt_out: Cell<bool>,
    extra_packages: Cell<bool>,
    plan: RefCell<Vec<String>>,
}

impl PlannerWorld {
    fn position(&self, step: &str) -> Option<usize> {
        self.plan.borrow().iter().position(|name| name == step)
    }
}

#[fixture]
fn planner_world() -> PlannerWorld {
    PlannerWorld::default()
}

#[given("a {os} host on {machine}")]
fn given_host(planner_world: &PlannerWorld, os: String, machine: String) {
    planner_world.os.set(Some(OsFamily::from_os_name(&os)));
    planner_world.machine.replace(machine);
}

#[given("the allocator is disabled")]
fn given_allocator_disabled(planner_world: &PlannerWorld) {
    planner_world.allocator_opt_out.set(true);
}

#[given("extra packages are requested")]
fn given_extra_packages(planner_world: &PlannerWorld) {
    planner_world.extra_packages.set(true);
}

#[when("the build is planned for {prefix}")]
fn when_planned(planner_world: &PlannerWorld, prefix: String) {
    let os = planner_world.os.get().expect("host should be set");
    let distro = if os == OsFamily::Linux {
        DistroIdentity::Unknown
    } else {
        DistroIdentity::NotLinux
    };
    let options = InstallOptions {
        staging_root: None,
        allocator_opt_out: planner_world.allocator_opt_out.get(),
        extra_packages: planner_world.extra_packages.get(),
    };
    let mut context =
        InstallationContext::new("/dist", Utf8PathBuf::from(prefix), None, options);
    let platform = platform_info(os, distro, &planner_world.machine.borrow());
    context.apply_platform_with_env(&platform, |_| None);

    let steps = plan_steps(&context, &DistributionManifest::builtin("1.0"));
    planner_world
        .plan
        .replace(steps.iter().map(ToString::to_string).collect());
}

#[then("the plan is {steps}")]
fn then_plan_is(planner_world: &PlannerWorld, steps: String) {
    let expected: Vec<&str> = steps.split(", ").collect();
    assert_eq!(*planner_world.plan.borrow(), expected);
}

#[then("the plan contains {step}")]
fn then_plan_contains(planner_world: &PlannerWorld, step: String) {
    assert!(
        planner_world.position(&step).is_some(),
        "expected {step} in {:?}",
        planner_world.plan.borrow()
    );
}

#[then("the plan starts with {step}")]
fn then_plan_starts_with(planner_world: &PlannerWorld, step: String) {
    assert_eq!(planner_world.position(&step), Some(0));
}

#[then("{later} directly follows {earlier}")]
fn then_directly_follows(planner_world: &PlannerWorld, later: String, earlier: String) {
    let earlier = planner_world
        .position(&earlier)
        .expect("earlier step should be planned");
    assert_eq!(planner_world.position(&later), Some(earlier + 1));
}

#[scenario(path = "tests/features/planner.feature", index = 0)]
fn scenario_linux_x86_64_plan(planner_world: PlannerWorld) {
    let _ = planner_world;
}

#[scenario(path = "tests/features/planner.feature", index = 1)]
fn scenario_allocator_opt_out(planner_world: PlannerWorld) {
    let _ = planner_world;
}

#[scenario(path = "tests/features/planner.feature", index = 2)]
fn scenario_macos_interposer(planner_world: PlannerWorld) {
    let _ = planner_world;
}

#[scenario(path = "tests/features/planner.feature", index = 3)]
fn scenario_ia64_unwind(planner_world: PlannerWorld) {
    let _ = planner_world;
}

#[scenario(path = "tests/features/planner.feature", index = 4)]
fn scenario_extra_packages(planner_world: PlannerWorld) {
    let _ = planner_world;
}
