//! 自检、安全复位、关节角度查询

use anyhow::Result;
use sortbot_sdk::ArmController;

pub fn check(controller: &ArmController) -> Result<()> {
    println!("⏳ 自检中...");
    controller.check()?;
    println!("✅ 自检通过");
    Ok(())
}

pub fn safety(controller: &ArmController) -> Result<()> {
    println!("⏳ 回到安全位姿...");
    let report = controller.safety()?;
    match report.time {
        Some(secs) => println!("✅ 安全复位完成（{:.1}s）", secs),
        None => println!("✅ 安全复位完成"),
    }
    Ok(())
}

pub fn angles(controller: &ArmController, json: bool) -> Result<()> {
    let angles = controller.current_angles()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&angles)?);
        return Ok(());
    }
    println!("📍 当前角度:");
    for (joint, angle) in &angles {
        println!("  {:<10} {:>7.1}°", joint, angle);
    }
    Ok(())
}
