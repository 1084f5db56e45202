#![no_main]

use libfuzzer_sys::fuzz_target;

use geode_core::{PdxInstance, PdxReader, PdxSerializable, PdxTypeRegistry, PdxWriter, Result};

#[derive(Debug, Default)]
struct FuzzPdx {
    byte_val: i8,
    bool_val: bool,
    int_val: i32,
    long_val: i64,
    double_val: f64,
    string_val: Option<String>,
    ints: Option<Vec<i32>>,
    names: Option<Vec<String>>,
}

impl PdxSerializable for FuzzPdx {
    const CLASS_NAME: &'static str = "fuzz.FuzzPdx";

    fn to_data(&self, writer: &mut dyn PdxWriter) -> Result<()> {
        writer.write_byte("byte", self.byte_val)?;
        writer.write_boolean("bool", self.bool_val)?;
        writer.write_string("string", self.string_val.as_deref())?;
        writer.write_int("int", self.int_val)?;
        writer.write_int_array("ints", self.ints.as_deref())?;
        writer.write_long("long", self.long_val)?;
        writer.write_string_array("names", self.names.as_deref())?;
        writer.write_double("double", self.double_val)
    }

    fn from_data(reader: &mut dyn PdxReader) -> Result<Self> {
        Ok(Self {
            byte_val: reader.read_byte("byte")?,
            bool_val: reader.read_boolean("bool")?,
            string_val: reader.read_string("string")?,
            int_val: reader.read_int("int")?,
            ints: reader.read_int_array("ints")?,
            long_val: reader.read_long("long")?,
            names: reader.read_string_array("names")?,
            double_val: reader.read_double("double")?,
        })
    }
}

fuzz_target!(|data: &[u8]| {
    let registry = PdxTypeRegistry::new();
    let type_id = match PdxInstance::from_object(&registry, &FuzzPdx::default()) {
        Ok(instance) => instance.type_id(),
        Err(_) => return,
    };

    // Arbitrary bytes as the body of a known type.
    let instance = PdxInstance::new(type_id, data.to_vec());
    let _ = instance.to_object::<FuzzPdx>(&registry);
    for name in ["byte", "string", "ints", "names", "double"] {
        let _ = instance.field(&registry, name);
    }

    // Arbitrary bytes as a tagged blob.
    if let Ok(instance) = PdxInstance::from_bytes(data) {
        let _ = instance.to_object::<FuzzPdx>(&registry);
    }
});
