//! 仿真硬件
//!
//! 所有设备句柄共享同一个 `World`，仿真时钟的 `sleep` 推进虚拟时间并积分电机运动，
//! 因此测试和 `--simulate` 模式都不需要真实等待。
//!
//! 几何模型：
//! - 底座航向 = 底座电机位置取模 360，目标是以角度区间表示的物体；
//! - 肩部位置增大为抬臂，到达上限时限位开关触发；
//! - 肩部低于抓取高度且底座对准物体时，夹爪传感器看到物体；
//! - 夹爪正转张开、反转闭合，顶到行程端点或物体时电流上升。

use crate::control::normalize_angle;
use crate::error::HardwareError;
use crate::hal::{
    ArmHardware, BrakeMode, Bumper, Clock, Direction, Display, DistanceSensor, HeadingSensor,
    Indicator, LedColor, Motor, MotorJoint, RangeSensor,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// 限位开关触发位置
const SHOULDER_LIMIT: f64 = 355.0;
/// 肩部机械上限
const SHOULDER_MAX: f64 = 360.0;
/// 肩部低于此位置时夹爪够得到物体
const GRIP_LEVEL: f64 = 120.0;
/// 夹爪完全张开的位置
const GRIPPER_OPEN: f64 = 90.0;
/// 夹住物体时夹爪停下的位置
const GRIPPER_ON_OBJECT: f64 = 30.0;
/// 夹爪相对物体边缘的余量（度）
const GRIPPER_REACH_DEG: f64 = 10.0;

const STALL_CURRENT: f64 = 0.8;
/// 空抓到底的电流：够释放阈值，不够抓取阈值
const EMPTY_CLOSE_CURRENT: f64 = 0.4;
const RUNNING_CURRENT: f64 = 0.15;
/// 无目标时的距离读数
const NO_TARGET_MM: f64 = 9999.0;
const EPSILON: f64 = 1e-6;

/// 场景中的物体（以底座航向上的角度区间表示）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimObject {
    pub center: f64,
    pub width: f64,
    pub distance: f64,
    pub size: u32,
}

impl SimObject {
    pub fn new(center: f64, width: f64, distance: f64, size: u32) -> Self {
        Self {
            center,
            width,
            distance,
            size,
        }
    }

    fn covers(&self, heading: f64, margin: f64) -> bool {
        let d = (heading - self.center).rem_euclid(360.0);
        d.min(360.0 - d) <= self.width / 2.0 + margin
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SimMotor {
    position: f64,
    /// 度/秒，带符号
    velocity: f64,
}

#[derive(Debug, Default)]
struct World {
    time: Duration,
    motors: [SimMotor; 4],
    objects: Vec<SimObject>,
    missing: Vec<&'static str>,
    led: Option<LedColor>,
    display: Vec<String>,
    base_travel: f64,
}

fn index(joint: MotorJoint) -> usize {
    match joint {
        MotorJoint::Base => 0,
        MotorJoint::Shoulder => 1,
        MotorJoint::Elbow => 2,
        MotorJoint::Gripper => 3,
    }
}

impl World {
    fn require(&self, device: &'static str) -> Result<(), HardwareError> {
        if self.missing.contains(&device) {
            Err(HardwareError::NotInstalled(device))
        } else {
            Ok(())
        }
    }

    fn motor(&self, joint: MotorJoint) -> &SimMotor {
        &self.motors[index(joint)]
    }

    fn motor_mut(&mut self, joint: MotorJoint) -> &mut SimMotor {
        &mut self.motors[index(joint)]
    }

    fn heading(&self) -> f64 {
        normalize_angle(self.motor(MotorJoint::Base).position)
    }

    fn object_under_base(&self) -> Option<&SimObject> {
        let heading = self.heading();
        self.objects.iter().find(|o| o.covers(heading, 0.0))
    }

    fn object_in_reach(&self) -> Option<&SimObject> {
        if self.motor(MotorJoint::Shoulder).position > GRIP_LEVEL {
            return None;
        }
        let heading = self.heading();
        self.objects
            .iter()
            .find(|o| o.covers(heading, GRIPPER_REACH_DEG))
    }

    fn gripper_lower_stop(&self) -> f64 {
        let gripper = self.motor(MotorJoint::Gripper).position;
        if self.object_in_reach().is_some() && gripper >= GRIPPER_ON_OBJECT - EPSILON {
            GRIPPER_ON_OBJECT
        } else {
            0.0
        }
    }

    fn advance(&mut self, dt: Duration) {
        let secs = dt.as_secs_f64();
        let gripper_floor = self.gripper_lower_stop();

        for joint in MotorJoint::ALL {
            let motor = self.motor_mut(joint);
            let step = motor.velocity * secs;
            let next = motor.position + step;
            motor.position = match joint {
                MotorJoint::Base => next,
                MotorJoint::Shoulder => next.clamp(0.0, SHOULDER_MAX),
                MotorJoint::Elbow => next.clamp(-720.0, 720.0),
                MotorJoint::Gripper => next.clamp(gripper_floor, GRIPPER_OPEN),
            };
            if joint == MotorJoint::Base {
                self.base_travel += step.abs();
            }
        }
        self.time += dt;
    }

    fn current(&self, joint: MotorJoint) -> f64 {
        let motor = self.motor(joint);
        if motor.velocity == 0.0 {
            return 0.0;
        }
        if joint != MotorJoint::Gripper {
            return RUNNING_CURRENT;
        }

        if motor.velocity > 0.0 {
            if motor.position >= GRIPPER_OPEN - EPSILON {
                return STALL_CURRENT;
            }
        } else if self.object_in_reach().is_some()
            && (motor.position - GRIPPER_ON_OBJECT).abs() <= EPSILON
        {
            return STALL_CURRENT;
        } else if motor.position <= EPSILON {
            return EMPTY_CLOSE_CURRENT;
        }
        RUNNING_CURRENT
    }
}

/// 仿真机械臂
///
/// 克隆共享同一个世界；`hardware()` 交给控制器，其余方法供测试观察状态。
#[derive(Clone)]
pub struct SimArm {
    world: Arc<Mutex<World>>,
}

impl SimArm {
    pub fn new() -> Self {
        let mut world = World::default();
        world.motors[index(MotorJoint::Shoulder)].position = 300.0;
        world.motors[index(MotorJoint::Gripper)].position = 45.0;
        Self {
            world: Arc::new(Mutex::new(world)),
        }
    }

    pub fn with_heading(self, heading: f64) -> Self {
        self.world.lock().motor_mut(MotorJoint::Base).position = heading;
        self
    }

    pub fn with_shoulder(self, position: f64) -> Self {
        self.world.lock().motor_mut(MotorJoint::Shoulder).position = position;
        self
    }

    pub fn with_gripper(self, position: f64) -> Self {
        self.world.lock().motor_mut(MotorJoint::Gripper).position = position;
        self
    }

    pub fn with_object(self, object: SimObject) -> Self {
        self.world.lock().objects.push(object);
        self
    }

    /// 移除一个设备（按设备名，如 `bumper`、`elbow_motor`）
    pub fn without(self, device: &'static str) -> Self {
        self.world.lock().missing.push(device);
        self
    }

    pub fn hardware(&self) -> ArmHardware {
        let motor = |joint| {
            Box::new(SimMotorHandle {
                world: self.world.clone(),
                joint,
            })
        };
        ArmHardware {
            base: motor(MotorJoint::Base),
            shoulder: motor(MotorJoint::Shoulder),
            elbow: motor(MotorJoint::Elbow),
            gripper: motor(MotorJoint::Gripper),
            heading: Box::new(SimHeading(self.world.clone())),
            base_distance: Box::new(SimRangeSensor {
                world: self.world.clone(),
                sensor: RangeSensor::Base,
            }),
            gripper_distance: Box::new(SimRangeSensor {
                world: self.world.clone(),
                sensor: RangeSensor::Gripper,
            }),
            bumper: Box::new(SimBumper(self.world.clone())),
            indicator: Box::new(SimIndicator(self.world.clone())),
            display: Box::new(SimDisplay(self.world.clone())),
        }
    }

    pub fn clock(&self) -> SimClock {
        SimClock {
            world: self.world.clone(),
        }
    }

    pub fn now(&self) -> Duration {
        self.world.lock().time
    }

    pub fn heading(&self) -> f64 {
        self.world.lock().heading()
    }

    pub fn shoulder_position(&self) -> f64 {
        self.world.lock().motor(MotorJoint::Shoulder).position
    }

    pub fn gripper_position(&self) -> f64 {
        self.world.lock().motor(MotorJoint::Gripper).position
    }

    /// 底座累计转过的角度（绝对值）
    pub fn base_travel(&self) -> f64 {
        self.world.lock().base_travel
    }

    pub fn is_spinning(&self, joint: MotorJoint) -> bool {
        self.world.lock().motor(joint).velocity != 0.0
    }

    pub fn bumper_pressed(&self) -> bool {
        self.world.lock().motor(MotorJoint::Shoulder).position >= SHOULDER_LIMIT
    }

    pub fn gripper_open(&self) -> bool {
        self.gripper_position() >= GRIPPER_OPEN - EPSILON
    }

    pub fn object_in_reach(&self) -> bool {
        self.world.lock().object_in_reach().is_some()
    }

    /// 夹爪停在物体上
    pub fn holding_object(&self) -> bool {
        let world = self.world.lock();
        world.object_in_reach().is_some()
            && (world.motor(MotorJoint::Gripper).position - GRIPPER_ON_OBJECT).abs() <= EPSILON
    }

    pub fn led(&self) -> Option<LedColor> {
        self.world.lock().led
    }

    pub fn display_lines(&self) -> Vec<String> {
        self.world.lock().display.clone()
    }
}

impl Default for SimArm {
    fn default() -> Self {
        Self::new()
    }
}

/// 仿真时钟：`sleep` 推进虚拟时间
#[derive(Clone)]
pub struct SimClock {
    world: Arc<Mutex<World>>,
}

impl Clock for SimClock {
    fn now(&self) -> Duration {
        self.world.lock().time
    }

    fn sleep(&self, duration: Duration) {
        self.world.lock().advance(duration);
        // 让出 CPU，仿真循环与主机线程同进程运行
        std::thread::yield_now();
    }
}

struct SimMotorHandle {
    world: Arc<Mutex<World>>,
    joint: MotorJoint,
}

impl Motor for SimMotorHandle {
    fn spin(&mut self, direction: Direction, rpm: f64) -> Result<(), HardwareError> {
        let mut world = self.world.lock();
        world.require(self.joint.device_name())?;
        trace!("sim {} spin {:?} at {} RPM", self.joint, direction, rpm);
        // 1 RPM = 6 度/秒
        world.motor_mut(self.joint).velocity = direction.sign() * rpm * 6.0;
        Ok(())
    }

    fn stop(&mut self, _mode: BrakeMode) -> Result<(), HardwareError> {
        let mut world = self.world.lock();
        world.require(self.joint.device_name())?;
        world.motor_mut(self.joint).velocity = 0.0;
        Ok(())
    }

    fn position(&self) -> Result<f64, HardwareError> {
        let world = self.world.lock();
        world.require(self.joint.device_name())?;
        Ok(world.motor(self.joint).position)
    }

    fn current(&self) -> Result<f64, HardwareError> {
        let world = self.world.lock();
        world.require(self.joint.device_name())?;
        Ok(world.current(self.joint))
    }

    fn is_installed(&self) -> bool {
        self.world.lock().require(self.joint.device_name()).is_ok()
    }
}

struct SimHeading(Arc<Mutex<World>>);

impl HeadingSensor for SimHeading {
    fn heading(&self) -> Result<f64, HardwareError> {
        let world = self.0.lock();
        world.require("heading")?;
        Ok(world.heading())
    }
}

struct SimRangeSensor {
    world: Arc<Mutex<World>>,
    sensor: RangeSensor,
}

impl SimRangeSensor {
    fn device(&self) -> &'static str {
        match self.sensor {
            RangeSensor::Base => "base_distance",
            RangeSensor::Gripper => "gripper_distance",
        }
    }

    fn read(&self) -> Result<(f64, u32), HardwareError> {
        let world = self.world.lock();
        world.require(self.device())?;
        let reading = match self.sensor {
            RangeSensor::Base => world
                .object_under_base()
                .map_or((NO_TARGET_MM, 0), |o| (o.distance, o.size)),
            RangeSensor::Gripper => match world.object_in_reach() {
                Some(o) => (25.0, o.size),
                None => (NO_TARGET_MM, 0),
            },
        };
        Ok(reading)
    }
}

impl DistanceSensor for SimRangeSensor {
    fn distance_mm(&self) -> Result<f64, HardwareError> {
        self.read().map(|(distance, _)| distance)
    }

    fn raw_size(&self) -> Result<u32, HardwareError> {
        self.read().map(|(_, size)| size)
    }

    fn is_installed(&self) -> bool {
        self.world.lock().require(self.device()).is_ok()
    }
}

struct SimBumper(Arc<Mutex<World>>);

impl Bumper for SimBumper {
    fn is_pressed(&self) -> Result<bool, HardwareError> {
        let world = self.0.lock();
        world.require("bumper")?;
        Ok(world.motor(MotorJoint::Shoulder).position >= SHOULDER_LIMIT)
    }

    fn is_installed(&self) -> bool {
        self.0.lock().require("bumper").is_ok()
    }
}

struct SimIndicator(Arc<Mutex<World>>);

impl Indicator for SimIndicator {
    fn set_color(&mut self, color: LedColor) -> Result<(), HardwareError> {
        let mut world = self.0.lock();
        world.require("indicator")?;
        world.led = Some(color);
        Ok(())
    }
}

struct SimDisplay(Arc<Mutex<World>>);

impl Display for SimDisplay {
    fn print(&mut self, text: &str) -> Result<(), HardwareError> {
        let mut world = self.0.lock();
        world.require("display")?;
        world.display.push(text.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_integrates_speed() {
        let sim = SimArm::new().with_heading(350.0);
        let mut hw = sim.hardware();
        let clock = sim.clock();

        hw.base.spin(Direction::Forward, 20.0).unwrap();
        clock.sleep(Duration::from_millis(250));
        assert!((sim.heading() - 20.0).abs() < 1e-9);
        assert!((sim.base_travel() - 30.0).abs() < 1e-9);
        assert_eq!(hw.base.current().unwrap(), RUNNING_CURRENT);
    }

    #[test]
    fn test_gripper_current_profile() {
        let sim = SimArm::new();
        let mut hw = sim.hardware();
        let clock = sim.clock();

        hw.gripper.spin(Direction::Forward, 20.0).unwrap();
        assert_eq!(hw.gripper.current().unwrap(), RUNNING_CURRENT);
        clock.sleep(Duration::from_secs(1));
        assert!(sim.gripper_open());
        assert_eq!(hw.gripper.current().unwrap(), STALL_CURRENT);

        hw.gripper.spin(Direction::Reverse, 20.0).unwrap();
        clock.sleep(Duration::from_secs(1));
        assert_eq!(sim.gripper_position(), 0.0);
        assert_eq!(hw.gripper.current().unwrap(), EMPTY_CLOSE_CURRENT);

        hw.gripper.stop(BrakeMode::Hold).unwrap();
        assert_eq!(hw.gripper.current().unwrap(), 0.0);
    }

    #[test]
    fn test_missing_device_errors() {
        let sim = SimArm::new().without("heading").without("base_motor");
        let mut hw = sim.hardware();
        assert_eq!(
            hw.heading.heading(),
            Err(HardwareError::NotInstalled("heading"))
        );
        assert!(hw.base.spin(Direction::Forward, 1.0).is_err());
        assert!(!hw.base.is_installed());
        assert!(hw.shoulder.is_installed());
    }

    #[test]
    fn test_gripper_sensor_needs_low_shoulder() {
        let sim = SimArm::new()
            .with_heading(95.0)
            .with_object(SimObject::new(90.0, 10.0, 100.0, 4));
        let hw = sim.hardware();
        assert_eq!(hw.gripper_distance.distance_mm().unwrap(), NO_TARGET_MM);

        let sim = sim.with_shoulder(GRIP_LEVEL);
        assert_eq!(hw.gripper_distance.distance_mm().unwrap(), 25.0);
        assert_eq!(hw.gripper_distance.raw_size().unwrap(), 4);
        assert!(sim.object_in_reach());
    }
}
