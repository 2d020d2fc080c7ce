//! Unit tests for devs-core primitives.

#[cfg(test)]
mod ids {
    use crate::NodeId;

    #[test]
    fn index_roundtrip() {
        let id = NodeId(42);
        assert_eq!(id.index(), 42);
        assert_eq!(NodeId::try_from(42usize).unwrap(), id);
    }

    #[test]
    fn invalid_sentinel_is_default() {
        assert_eq!(NodeId::INVALID.0, u32::MAX);
        assert_eq!(NodeId::default(), NodeId::INVALID);
        assert_eq!(NodeId(7).to_string(), "NodeId(7)");
    }
}

#[cfg(test)]
mod time {
    use crate::{Duration, Time, TimeUnit};

    #[test]
    fn mixed_units_compare_by_value() {
        assert_eq!(Duration::seconds(2), Duration::millis(2_000));
        assert!(Duration::millis(1_500) < Duration::seconds(2));
        assert_eq!(Time::new(1, TimeUnit::Minutes), Time::new(60, TimeUnit::Seconds));
    }

    #[test]
    fn mixed_unit_sum_uses_finer_unit() {
        let d = Duration::seconds(1) + Duration::millis(250);
        assert_eq!(d.unit(), TimeUnit::Milliseconds);
        assert_eq!(d.ticks(), 1_250);
    }

    #[test]
    fn infinity_absorbs_and_is_greatest() {
        let inf = Duration::INFINITY;
        assert!(inf > Duration::new(u64::MAX - 1, TimeUnit::Hours));
        assert!((inf + Duration::seconds(3)).is_infinite());
        assert!((Time::zero(TimeUnit::Seconds) + inf).is_infinite());
        assert_eq!(Duration::infinity(TimeUnit::Milliseconds), Duration::INFINITY);
    }

    #[test]
    fn checked_sub_rejects_negative_and_infinite_rhs() {
        assert_eq!(
            Duration::seconds(5).checked_sub(Duration::seconds(2)),
            Some(Duration::seconds(3))
        );
        assert_eq!(Duration::seconds(1).checked_sub(Duration::seconds(2)), None);
        assert_eq!(Duration::seconds(1).checked_sub(Duration::INFINITY), None);
        assert_eq!(
            Duration::INFINITY.checked_sub(Duration::seconds(2)),
            Some(Duration::INFINITY)
        );
    }

    #[test]
    fn time_difference() {
        let t0 = Time::new(3, TimeUnit::Seconds);
        let t1 = Time::new(5_500, TimeUnit::Milliseconds);
        assert_eq!(t1 - t0, Duration::millis(2_500));
        assert_eq!(t0.checked_duration_since(t1), None);
    }

    #[test]
    #[should_panic(expected = "time underflow")]
    fn backwards_time_subtraction_panics() {
        let _ = Time::new(1, TimeUnit::Seconds) - Time::new(2, TimeUnit::Seconds);
    }

    #[test]
    fn float_conversions() {
        assert_eq!(Duration::from_secs_f64(0.5, TimeUnit::Milliseconds), Duration::millis(500));
        assert!(Duration::from_secs_f64(f64::INFINITY, TimeUnit::Seconds).is_infinite());
        assert_eq!(Duration::seconds(4).mul_f64(0.5), Duration::seconds(2));
        assert_eq!(Duration::seconds(3).to_std(), Some(std::time::Duration::from_secs(3)));
        assert_eq!(Duration::INFINITY.to_std(), None);
    }

    #[test]
    fn display() {
        assert_eq!(Time::new(5, TimeUnit::Seconds).to_string(), "t=5s");
        assert_eq!(Time::INFINITY.to_string(), "t=inf");
        assert_eq!(Duration::millis(12).to_string(), "12ms");
    }
}

#[cfg(test)]
mod converters {
    use crate::{Converter, Event, EventType, Time};

    #[derive(Debug, PartialEq)]
    struct Celsius(f64);

    fn t0() -> Time {
        Time::default()
    }

    #[test]
    fn identity_composition_stays_identity() {
        let id = Converter::identity();
        assert!(id.then(&Converter::identity()).is_identity());
        assert!(Converter::default().is_identity());
    }

    #[test]
    fn identity_is_neutral_element() {
        let f = Converter::retype("B");
        assert!(!f.then(&Converter::identity()).is_identity());
        let e = f.then(&Converter::identity()).convert(Event::new("A", t0()));
        assert_eq!(e.event_type().as_str(), "B");
        let e = Converter::identity().then(&f).convert(Event::new("A", t0()));
        assert_eq!(e.event_type().as_str(), "B");
    }

    #[test]
    fn then_applies_left_first() {
        let add = Converter::new(|e: Event| e.map_payload(|p: Option<&Celsius>| {
            Celsius(p.map_or(0.0, |c| c.0) + 1.0)
        }));
        let dbl = Converter::new(|e: Event| e.map_payload(|p: Option<&Celsius>| {
            Celsius(p.map_or(0.0, |c| c.0) * 2.0)
        }));
        let e = Event::new("T", t0()).with_payload(Celsius(3.0));
        assert_eq!(add.then(&dbl).convert(e.clone()).payload::<Celsius>(), Some(&Celsius(8.0)));
        assert_eq!(dbl.then(&add).convert(e).payload::<Celsius>(), Some(&Celsius(7.0)));
    }

    #[test]
    fn retype_keeps_time_and_payload() {
        let e = Event::new("Heat", Time::new(9, crate::TimeUnit::Seconds)).with_payload(4u32);
        let out = Converter::retype(EventType::new("Warm")).convert(e);
        assert_eq!(out.event_type(), &EventType::from_static("Warm"));
        assert_eq!(out.time_of_occurrence(), Time::new(9, crate::TimeUnit::Seconds));
        assert_eq!(out.payload::<u32>(), Some(&4));
    }

    #[test]
    fn sink_without_converter_is_identity() {
        let sink = crate::EventSink::new("b", "E");
        assert!(sink.converter().is_identity());
        let sink = sink.with_converter(Converter::retype("F"));
        assert!(!sink.converter().is_identity());
    }
}

#[cfg(test)]
mod values {
    use crate::{
        AnyValue, CoreError, ImportSlot, Time, TimeUnit, Value, VariableDescriptor,
        VariableType, Visibility,
    };

    #[test]
    fn importer_sees_writes_with_timestamp() {
        let owner = Value::new("heater", Visibility::Exported, 20.0_f64);
        let mut slot = ImportSlot::<f64>::new("temperature");
        slot.bind(&owner.erase()).unwrap();

        assert!(!owner.is_initialised());
        owner.set(21.5, Time::new(3, TimeUnit::Seconds));
        assert_eq!(slot.read().unwrap(), (21.5, Some(Time::new(3, TimeUnit::Seconds))));
        owner.set(22.0, Time::new(4, TimeUnit::Seconds));
        assert_eq!(slot.get().unwrap(), 22.0);
    }

    #[test]
    fn unbound_slot_errors() {
        let slot = ImportSlot::<f64>::new("x");
        assert!(matches!(slot.get(), Err(CoreError::UnboundImport(n)) if n == "x"));
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let owner = Value::new("m", Visibility::Exported, 1_u32);
        let any: AnyValue = owner.erase();
        assert_eq!(any.ty(), VariableType::of::<u32>());
        assert!(matches!(
            any.downcast_import::<f64>(),
            Err(CoreError::ValueTypeMismatch { .. })
        ));
    }

    #[test]
    fn importer_does_not_keep_value_alive() {
        let owner = Value::new("m", Visibility::Exported, 1.0_f64);
        let reader = owner.reader();
        assert_eq!(reader.owner().unwrap(), "m");
        drop(owner);
        assert!(matches!(reader.get(), Err(CoreError::ValueDropped)));
    }

    #[test]
    fn erased_handles_share_the_cell() {
        let owner = Value::new("m", Visibility::Exported, 0_i64);
        assert!(owner.erase().same_cell(&owner.erase()));
        let other = Value::new("m", Visibility::Exported, 0_i64);
        assert!(!owner.erase().same_cell(&other.erase()));
    }

    #[test]
    fn descriptors() {
        let d = VariableDescriptor::exported::<f64>("x");
        assert_eq!(d.visibility, Visibility::Exported);
        assert_eq!(d.key().ty, VariableType::of::<f64>());
        assert_ne!(VariableType::of::<f64>(), VariableType::of::<f32>());
    }
}

#[cfg(test)]
mod params_and_reports {
    use crate::{RunParameters, SimRng, SimulationReport};

    #[test]
    fn parameters_are_scoped_per_model() {
        let params = RunParameters::new()
            .with("a", "gain", 2.5_f64)
            .with("b", "gain", 7_u32);
        assert_eq!(params.get::<f64>("a", "gain"), Some(&2.5));
        assert_eq!(params.get::<u32>("b", "gain"), Some(&7));
        assert_eq!(params.get::<u32>("a", "gain"), None);
        assert_eq!(params.names_for("a").collect::<Vec<_>>(), vec!["gain"]);
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn report_tree_lookup() {
        let report = SimulationReport::coupled(
            "root",
            vec![SimulationReport::atomic("a", 3_u32), SimulationReport::empty("b")],
        );
        assert_eq!(report.find("a").and_then(|r| r.payload_as::<u32>()), Some(&3));
        assert!(report.find("b").unwrap().payload.is_none());
        assert!(report.find("c").is_none());
        assert_eq!(report.to_string(), "root\n  a: 3\n  b\n");
    }

    #[test]
    fn grafted_report_replaces_its_namesake() {
        let mut report = SimulationReport::coupled(
            "root",
            vec![SimulationReport::atomic("a", 3_u32), SimulationReport::empty("pump")],
        );
        let pump = SimulationReport::coupled("pump", vec![SimulationReport::atomic("pump.motor", 1_u8)]);
        assert!(report.graft(pump));
        assert_eq!(report.find("pump.motor").and_then(|r| r.payload_as::<u8>()), Some(&1));
        assert!(!report.graft(SimulationReport::empty("valve")));
        assert_eq!(report.to_string(), "root\n  a: 3\n  pump\n    pump.motor: 1\n");
    }

    #[test]
    fn rng_is_reproducible() {
        let mut a = SimRng::new(11);
        let mut b = SimRng::new(11);
        let xs: Vec<usize> = (0..16).filter_map(|_| a.choose_index(5)).collect();
        let ys: Vec<usize> = (0..16).filter_map(|_| b.choose_index(5)).collect();
        assert_eq!(xs, ys);
        assert_eq!(a.choose_index(0), None);
    }
}
