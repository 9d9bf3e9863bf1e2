//! Traces a create/finalize/destroy workload into `trace.json`.
//!
//! Run with `cargo run --release --features profiling --bin profile_lifecycle`.

#[cfg(feature = "profiling")]
mod workload {
    use std::fs::File;
    use std::time::Instant;

    use lifecycle_ecs::{Component, ComponentView, EntityHandle, World};

    #[allow(dead_code)]
    struct Position(f32, f32, f32);
    impl Component for Position {}

    /// Refuses to go live with zero hit points or without a position.
    struct Health(u32);
    impl Component for Health {
        fn finalize(&mut self, _entity: EntityHandle, siblings: &ComponentView<'_>) -> bool {
            self.0 > 0 && siblings.contains::<Position>()
        }
    }

    fn attach<T: Component>(world: &mut World, entity: EntityHandle, component: T) {
        if let Err(err) = world.add_component(entity, component) {
            tracing::warn!(entity = %entity, %err, "component not attached");
        }
    }

    #[tracing::instrument(skip(world))]
    fn churn(world: &mut World, count: usize) {
        let mut live = Vec::with_capacity(count);
        for i in 0..count {
            let entity = world.create_entity();
            attach(world, entity, Position(i as f32, 0.0, 0.0));
            // Every tenth entity is vetoed during finalize.
            attach(world, entity, Health(if i % 10 == 0 { 0 } else { 100 }));
            live.push(entity);
        }
        world.process_commands();
        tracing::info!(alive = world.entity_count(), "batch finalized");

        for entity in live.into_iter().step_by(2) {
            world.destroy_entity(entity);
        }
        world.process_commands();
        tracing::info!(alive = world.entity_count(), "half destroyed");
    }

    pub fn run() {
        let file = match File::create("trace.json") {
            Ok(file) => file,
            Err(err) => {
                eprintln!("cannot create trace.json: {err}");
                return;
            }
        };
        let (writer, _guard) = tracing_appender::non_blocking(file);
        tracing_subscriber::fmt()
            .json()
            .with_writer(writer)
            .with_max_level(tracing::Level::TRACE)
            .init();

        let mut world = World::new();
        for round in 0..3 {
            let started = Instant::now();
            churn(&mut world, 10_000);
            println!(
                "round {round}: {:?}, {} alive, {} slots",
                started.elapsed(),
                world.entity_count(),
                world.entities().slot_count()
            );
        }
        world.shutdown();
    }
}

#[cfg(feature = "profiling")]
fn main() {
    workload::run();
}

#[cfg(not(feature = "profiling"))]
fn main() {
    println!("profile_lifecycle requires --features profiling");
}
